use serde::Serialize;

/// Number of MBConv blocks the catalog expects between the stem and the top.
pub const BLOCK_COUNT: usize = 16;

/// Stem, every block, and the top.
pub const LAYER_COUNT: usize = BLOCK_COUNT + 2;

/// One exposable feature-map layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerEntry {
    pub index: usize,
    /// Stable layer name, matching the reference Keras graph.
    pub name: &'static str,
    /// Short label shown on the layer selector.
    pub display_name: &'static str,
}

/// Where a catalog layer sits in the forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapPoint {
    /// Output of the stem convolution's activation.
    Stem,
    /// Output of the block with this 0-based position.
    Block(usize),
    /// Output of the top convolution's activation.
    Top,
}

const fn entry(index: usize, name: &'static str, display_name: &'static str) -> LayerEntry {
    LayerEntry { index, name, display_name }
}

/// Candidate Grad-CAM layers in depth order, shallow to deep. Entries 1..=16
/// are the outputs of the sixteen blocks: the projection BN for the first
/// block of a stage, the residual add for the rest.
pub static LAYER_CATALOG: [LayerEntry; LAYER_COUNT] = [
    entry(0, "stem_activation", "stem"),
    entry(1, "block1a_project_bn", "1a"),
    entry(2, "block2a_project_bn", "2a"),
    entry(3, "block2b_add", "2b"),
    entry(4, "block3a_project_bn", "3a"),
    entry(5, "block3b_add", "3b"),
    entry(6, "block4a_project_bn", "4a"),
    entry(7, "block4b_add", "4b"),
    entry(8, "block4c_add", "4c"),
    entry(9, "block5a_project_bn", "5a"),
    entry(10, "block5b_add", "5b"),
    entry(11, "block5c_add", "5c"),
    entry(12, "block6a_project_bn", "6a"),
    entry(13, "block6b_add", "6b"),
    entry(14, "block6c_add", "6c"),
    entry(15, "block6d_add", "6d"),
    entry(16, "block7a_project_bn", "7a"),
    entry(17, "top_activation", "top"),
];

impl LayerEntry {
    pub fn tap_point(&self) -> TapPoint {
        match self.index {
            0 => TapPoint::Stem,
            i if i <= BLOCK_COUNT => TapPoint::Block(i - 1),
            _ => TapPoint::Top,
        }
    }
}
