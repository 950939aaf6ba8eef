/// ferrite-cam Studio
///
/// A browser front-end for Grad-CAM: upload an image, read the top-5 table,
/// pick a class row and a layer, and see which regions drove the decision.
/// Served by a synchronous tiny_http server; no JavaScript frameworks required.
///
/// Run with:
///   cargo run --bin studio --release -- --weights efficientnet_b0.safetensors \
///       --labels imagenet_class_index.json
/// Then open http://127.0.0.1:7878
mod state;
mod render;
mod routes;
mod handlers;
mod util;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tiny_http::Server;
use tracing::{error, info};

use ferrite_cam::{CamError, EngineConfig, GradCam, NetworkSpec};
use state::StudioState;

#[derive(Parser)]
#[command(name = "studio", about = "Grad-CAM studio for EfficientNet-B0.")]
struct Cli {
    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1:7878")]
    bind: String,

    /// Engine configuration JSON (weights, labels, alpha, score target)
    #[arg(long, conflicts_with_all = ["weights", "labels", "random"])]
    config: Option<PathBuf>,

    /// EfficientNet-B0 weights in safetensors format
    #[arg(long, requires = "labels")]
    weights: Option<PathBuf>,

    /// imagenet_class_index.json
    #[arg(long, requires = "weights")]
    labels: Option<PathBuf>,

    /// Serve a randomly initialised network with this seed (UI development)
    #[arg(long, conflicts_with_all = ["weights", "labels"])]
    random: Option<u64>,
}

fn build_engine(cli: &Cli) -> Result<GradCam, CamError> {
    match (&cli.config, &cli.weights, &cli.labels, cli.random) {
        (Some(path), ..) => GradCam::from_config(&EngineConfig::load_json(path)?),
        (None, Some(weights), Some(labels), _) => {
            GradCam::from_config(&EngineConfig::new(weights.clone(), labels.clone()))
        }
        (None, None, None, Some(seed)) => {
            info!(seed, "serving a randomly initialised network");
            GradCam::random(NetworkSpec::default(), seed)
        }
        _ => Err(CamError::Config("pass --config, --weights with --labels, or --random".into())),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // The network is loaded once and shared read-only by every request.
    let engine = match build_engine(&cli) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "could not load the Grad-CAM engine");
            std::process::exit(1);
        }
    };
    let server = match Server::http(&cli.bind) {
        Ok(server) => server,
        Err(e) => {
            error!(bind = %cli.bind, error = %e, "failed to bind HTTP server");
            std::process::exit(1);
        }
    };

    let shared_state = Arc::new(StudioState::new(engine));
    info!("studio listening on http://{}", cli.bind);

    // One thread per request; a slow Grad-CAM pass only blocks its own caller.
    for request in server.incoming_requests() {
        let state_clone = shared_state.clone();
        std::thread::spawn(move || {
            routes::dispatch(request, state_clone);
        });
    }
}
