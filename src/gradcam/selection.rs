//! Maps user-facing layer and class choices onto network identifiers.

use std::fmt;

use crate::error::{CamError, Result};
use crate::gradcam::predict::TOP_K;
use crate::network::catalog::{LayerEntry, LAYER_CATALOG, LAYER_COUNT};
use crate::network::ClassScores;

/// Validated index into the layer catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerIndex(usize);

impl LayerIndex {
    /// The deepest, most class-discriminative layer (`top`).
    pub const DEFAULT: LayerIndex = LayerIndex(LAYER_COUNT - 1);

    /// Out-of-range indices are a caller error and are never clamped.
    pub fn new(index: usize) -> Result<LayerIndex> {
        if index < LAYER_COUNT {
            Ok(LayerIndex(index))
        } else {
            Err(CamError::LayerOutOfRange { index, max: LAYER_COUNT - 1 })
        }
    }

    pub fn get(self) -> usize {
        self.0
    }

    pub fn entry(self) -> &'static LayerEntry {
        &LAYER_CATALOG[self.0]
    }
}

impl Default for LayerIndex {
    fn default() -> Self {
        LayerIndex::DEFAULT
    }
}

impl TryFrom<usize> for LayerIndex {
    type Error = CamError;

    fn try_from(index: usize) -> Result<LayerIndex> {
        LayerIndex::new(index)
    }
}

impl fmt::Display for LayerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.entry().name)
    }
}

/// Validated 0-based position in the top-5 prediction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassRank(usize);

impl ClassRank {
    pub fn new(rank: usize) -> Result<ClassRank> {
        if rank < TOP_K {
            Ok(ClassRank(rank))
        } else {
            Err(CamError::RankOutOfRange { rank, max: TOP_K - 1 })
        }
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl TryFrom<usize> for ClassRank {
    type Error = CamError;

    fn try_from(rank: usize) -> Result<ClassRank> {
        ClassRank::new(rank)
    }
}

/// Which class the heatmap explains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassSelection {
    /// No row picked: the single highest-scoring class.
    #[default]
    Top,
    /// A row of the top-5 table.
    Rank(ClassRank),
}

impl ClassSelection {
    /// `None` means no row was selected.
    pub fn from_rank(rank: Option<usize>) -> Result<ClassSelection> {
        match rank {
            None => Ok(ClassSelection::Top),
            Some(r) => Ok(ClassSelection::Rank(ClassRank::new(r)?)),
        }
    }
}

/// Resolves a selection to a class index using the same ordering the
/// prediction table was built from.
pub fn resolve_class(scores: &ClassScores, selection: ClassSelection) -> Result<usize> {
    match selection {
        ClassSelection::Top => Ok(scores.argmax()),
        ClassSelection::Rank(rank) => scores
            .top_k(TOP_K)
            .get(rank.get())
            .copied()
            .ok_or(CamError::RankUnavailable { rank: rank.get(), classes: scores.len() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn default_layer_is_top() {
        assert_eq!(LayerIndex::default().get(), 17);
        assert_eq!(LayerIndex::default().entry().name, "top_activation");
    }

    #[rstest]
    #[case(18)]
    #[case(usize::MAX)]
    fn layer_indices_are_not_clamped(#[case] index: usize) {
        assert!(matches!(LayerIndex::new(index), Err(CamError::LayerOutOfRange { .. })));
    }

    #[rstest]
    fn ranks_stop_at_four() {
        assert!(ClassRank::new(4).is_ok());
        assert!(matches!(ClassRank::new(5), Err(CamError::RankOutOfRange { rank: 5, max: 4 })));
    }

    #[rstest]
    fn top_uses_the_full_argmax() {
        let scores = ClassScores::from_logits(vec![0.1, 0.9, 0.3, 5.0, 0.2, 0.0]);
        assert_eq!(resolve_class(&scores, ClassSelection::Top).expect("class"), 3);
    }

    #[rstest]
    #[case(0, 3)]
    #[case(1, 1)]
    #[case(4, 0)]
    fn ranks_follow_the_table(#[case] rank: usize, #[case] expected: usize) {
        let scores = ClassScores::from_logits(vec![0.1, 0.9, 0.3, 5.0, 0.2, 0.0]);
        let selection = ClassSelection::from_rank(Some(rank)).expect("rank");
        assert_eq!(resolve_class(&scores, selection).expect("class"), expected);
    }

    #[rstest]
    fn small_vocabularies_cannot_serve_every_rank() {
        let scores = ClassScores::from_logits(vec![0.0, 1.0]);
        let selection = ClassSelection::from_rank(Some(3)).expect("rank");
        assert!(matches!(resolve_class(&scores, selection), Err(CamError::RankUnavailable { .. })));
    }
}
