pub mod preprocess;
pub mod predict;
pub mod selection;
pub mod extract;
pub mod synthesize;
pub mod colormap;
pub mod composite;
pub mod pipeline;

pub use colormap::Colormap;
pub use composite::{Compositor, DEFAULT_ALPHA};
pub use extract::{extract, Extraction};
pub use pipeline::{Explanation, GradCam};
pub use predict::{predict, top_predictions, Prediction, TOP_K};
pub use preprocess::{decode_image, prepare, PreparedImage};
pub use selection::{resolve_class, ClassRank, ClassSelection, LayerIndex};
pub use synthesize::{synthesize, Heatmap};
