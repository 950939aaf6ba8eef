use serde::Serialize;

use crate::math::tensor::Tensor;
use crate::network::{ClassScores, EfficientNet, Labels};

/// Length of the prediction table.
pub const TOP_K: usize = 5;

/// One row of the prediction table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// 0-based position in the table.
    pub rank: usize,
    /// Index into the full class vocabulary.
    pub class_index: usize,
    /// Display label, e.g. `Tiger Cat`.
    pub label: String,
    /// Softmax probability in [0, 1].
    pub confidence: f32,
}

impl Prediction {
    /// Confidence rounded to three decimals for display.
    pub fn display_confidence(&self) -> f32 {
        (self.confidence * 1000.0).round() / 1000.0
    }
}

/// Builds the top-5 table from a score vector.
pub fn top_predictions(scores: &ClassScores, labels: &Labels) -> Vec<Prediction> {
    scores
        .top_k(TOP_K)
        .into_iter()
        .enumerate()
        .map(|(rank, class_index)| Prediction {
            rank,
            class_index,
            label: labels.display(class_index),
            confidence: scores.probabilities[class_index],
        })
        .collect()
}

/// Runs the network on a prepared input and returns the top-5 table.
pub fn predict(network: &EfficientNet, labels: &Labels, input: &Tensor) -> Vec<Prediction> {
    top_predictions(&network.scores(input), labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn table_is_sorted_and_labelled() {
        let scores = ClassScores::from_logits(vec![0.0, 3.0, 1.0, 2.0, -1.0, 0.5, 4.0]);
        let labels = Labels::from_names(["a", "tiger_cat", "c", "d", "e", "f", "tabby"]);
        let table = top_predictions(&scores, &labels);
        assert_eq!(table.len(), TOP_K);
        assert_eq!(table[0].label, "Tabby");
        assert_eq!(table[1].label, "Tiger Cat");
        assert!(table.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert!(table.iter().enumerate().all(|(i, p)| p.rank == i));
    }

    #[rstest]
    #[case(0.12345, 0.123)]
    #[case(0.9996, 1.0)]
    #[case(0.0004, 0.0)]
    fn rounds_for_display(#[case] confidence: f32, #[case] expected: f32) {
        let p = Prediction { rank: 0, class_index: 0, label: String::new(), confidence };
        assert!((p.display_confidence() - expected).abs() < 1e-6);
    }
}
