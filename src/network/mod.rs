pub mod catalog;
pub mod spec;
pub mod weights;
pub mod scores;
pub mod block;
pub mod efficientnet;
pub mod labels;

pub use catalog::{LayerEntry, TapPoint, LAYER_CATALOG, LAYER_COUNT};
pub use efficientnet::{EfficientNet, ForwardTrace, TappedForward};
pub use labels::Labels;
pub use scores::{ClassScores, ScoreTarget};
pub use spec::{BlockSpec, NetworkSpec, Preprocessing};
