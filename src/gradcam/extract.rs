use std::time::Instant;

use tracing::debug;

use crate::error::Result;
use crate::gradcam::selection::{resolve_class, ClassSelection, LayerIndex};
use crate::math::tensor::Tensor;
use crate::network::{ClassScores, EfficientNet, ScoreTarget};

/// Activation and class-score gradient at one catalog layer.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// `H × W × C` activation of the tapped layer.
    pub activation: Tensor,
    /// ∂score/∂activation, same shape as `activation`.
    pub gradient: Tensor,
    /// Class the gradient was taken for.
    pub class_index: usize,
    /// Scores of the same forward pass.
    pub scores: ClassScores,
}

/// One forward pass exposing `layer`, then reverse mode from the selected
/// class score back to that layer.
pub fn extract(
    network: &EfficientNet,
    input: &Tensor,
    layer: LayerIndex,
    selection: ClassSelection,
    target: ScoreTarget,
) -> Result<Extraction> {
    let started = Instant::now();
    let tapped = network.forward_tapped(input, layer.entry())?;
    let class_index = resolve_class(&tapped.scores, selection)?;
    debug!(layer = %layer, class_index, elapsed = ?started.elapsed(), "forward pass");

    let started = Instant::now();
    let grad_logits = tapped.scores.score_gradient(class_index, target);
    let gradient = network.backward_to_tap(&tapped.trace, &grad_logits);
    debug!(layer = %layer, elapsed = ?started.elapsed(), "backward pass");

    Ok(Extraction { activation: tapped.activation, gradient, class_index, scores: tapped.scores })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradcam::predict::TOP_K;
    use crate::layers::test_support::seeded_tensor;
    use crate::network::NetworkSpec;
    use rstest::{fixture, rstest};

    #[fixture]
    fn tiny() -> EfficientNet {
        EfficientNet::random(NetworkSpec::tiny(), 7).expect("tiny network")
    }

    #[rstest]
    #[case(0)]
    #[case(4)]
    #[case(17)]
    fn gradient_has_the_activation_shape(tiny: EfficientNet, #[case] layer: usize) {
        let x = seeded_tensor(64, 64, 3, 11);
        let layer = LayerIndex::new(layer).expect("layer");
        let out = extract(&tiny, &x, layer, ClassSelection::Top, ScoreTarget::Probability).expect("extract");
        assert_eq!(out.gradient.shape(), out.activation.shape());
        assert_eq!(out.class_index, out.scores.argmax());
    }

    #[rstest]
    fn rank_selection_follows_the_table(tiny: EfficientNet) {
        let x = seeded_tensor(64, 64, 3, 12);
        let order = tiny.scores(&x).top_k(TOP_K);
        for (rank, expected) in order.into_iter().enumerate() {
            let selection = ClassSelection::from_rank(Some(rank)).expect("rank");
            let out = extract(&tiny, &x, LayerIndex::DEFAULT, selection, ScoreTarget::Logit).expect("extract");
            assert_eq!(out.class_index, expected);
        }
    }
}
