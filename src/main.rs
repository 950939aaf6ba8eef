use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::info;

use ferrite_cam::gradcam::decode_image;
use ferrite_cam::{CamError, ClassSelection, EngineConfig, GradCam, LayerIndex, NetworkSpec, Prediction, Result, LAYER_CATALOG};

#[derive(Parser)]
#[command(
    name = "ferrite-cam",
    about = "Grad-CAM saliency heatmaps for EfficientNet-B0, computed from scratch."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EngineArgs {
    /// Engine configuration JSON (weights, labels, alpha, score target)
    #[arg(long, conflicts_with_all = ["weights", "labels", "random"])]
    config: Option<PathBuf>,

    /// EfficientNet-B0 weights in safetensors format
    #[arg(long, requires = "labels")]
    weights: Option<PathBuf>,

    /// imagenet_class_index.json
    #[arg(long, requires = "weights")]
    labels: Option<PathBuf>,

    /// Use a randomly initialised network with this seed instead of weights
    #[arg(long, conflicts_with_all = ["weights", "labels"])]
    random: Option<u64>,
}

impl EngineArgs {
    fn build(self) -> Result<GradCam> {
        match (self.config, self.weights, self.labels, self.random) {
            (Some(path), ..) => GradCam::from_config(&EngineConfig::load_json(&path)?),
            (None, Some(weights), Some(labels), _) => GradCam::from_config(&EngineConfig::new(weights, labels)),
            (None, None, None, Some(seed)) => {
                info!(seed, "using a randomly initialised network");
                GradCam::random(NetworkSpec::default(), seed)
            }
            _ => Err(CamError::Config("pass --config, --weights with --labels, or --random".into())),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the selectable Grad-CAM layers
    Layers,

    /// Print the top-5 predictions for an image
    Predict {
        #[arg(long)]
        image: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Render a Grad-CAM overlay for an image
    Explain {
        #[arg(long)]
        image: PathBuf,

        /// Catalog layer index, 0 (stem) to 17 (top)
        #[arg(long, default_value_t = LayerIndex::DEFAULT.get())]
        layer: usize,

        /// Row of the top-5 table to explain; the top class when omitted
        #[arg(long)]
        rank: Option<usize>,

        /// Where to write the overlay PNG
        #[arg(long, default_value = "gradcam.png")]
        out: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

fn read_image(path: &Path) -> Result<image::DynamicImage> {
    let bytes = std::fs::read(path).map_err(|source| CamError::Io { path: path.to_owned(), source })?;
    decode_image(&bytes)
}

fn print_table(predictions: &[Prediction]) {
    for p in predictions {
        println!("  {}. {:<32} {:.3}", p.rank + 1, p.label, p.display_confidence());
    }
}

fn cmd_layers() {
    for entry in LAYER_CATALOG.iter() {
        println!("{:>2}  {:<5} {}", entry.index, entry.display_name, entry.name);
    }
}

fn cmd_predict(image: PathBuf, engine: EngineArgs) -> Result<()> {
    let engine = engine.build()?;
    let predictions = engine.predict(&read_image(&image)?);
    println!("Predictions for {}:", image.display());
    print_table(&predictions);
    Ok(())
}

fn cmd_explain(image: PathBuf, layer: usize, rank: Option<usize>, out: PathBuf, engine: EngineArgs) -> Result<()> {
    let layer = LayerIndex::new(layer)?;
    let selection = ClassSelection::from_rank(rank)?;
    let engine = engine.build()?;

    let explanation = engine.explain(&read_image(&image)?, layer, selection)?;
    explanation.overlay.save(&out).map_err(CamError::Encode)?;

    println!("Predictions for {}:", image.display());
    print_table(&explanation.predictions);
    println!();
    println!("Explained class: {} (index {})", explanation.label, explanation.class_index);
    println!(
        "Layer:           {} ({}x{} map)",
        layer, explanation.heatmap.width, explanation.heatmap.height
    );
    println!("Overlay:         {}", out.display());
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Layers => {
            cmd_layers();
            Ok(())
        }
        Commands::Predict { image, engine } => cmd_predict(image, engine),
        Commands::Explain { image, layer, rank, out, engine } => cmd_explain(image, layer, rank, out, engine),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
