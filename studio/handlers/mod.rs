pub mod api;
pub mod gradcam;
