use std::sync::Arc;

use ferrite_cam::GradCam;

/// Process-wide studio state.
///
/// Requests are stateless: the only shared thing is the engine, which is
/// read-only, so no lock is needed.
pub struct StudioState {
    pub engine: GradCam,
}

impl StudioState {
    pub fn new(engine: GradCam) -> Self {
        StudioState { engine }
    }

    /// Shown in the page header, e.g. `efficientnet-b0 · 1000 classes`.
    pub fn network_summary(&self) -> String {
        let spec = self.engine.network().spec();
        format!("{} · {} classes · {}px input", spec.name, spec.num_classes, spec.image_size)
    }
}

/// Shared state type, an `Arc<StudioState>` passed to every handler.
pub type SharedState = Arc<StudioState>;
