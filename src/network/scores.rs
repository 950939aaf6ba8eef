use serde::{Serialize, Deserialize};

/// Which scalar of the network output is differentiated for Grad-CAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTarget {
    /// The softmax probability of the class, which is what the classifier emits.
    #[default]
    Probability,
    /// The raw pre-softmax logit of the class.
    Logit,
}

/// Per-class output of one forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScores {
    pub logits: Vec<f32>,
    pub probabilities: Vec<f32>,
}

impl ClassScores {
    pub fn from_logits(logits: Vec<f32>) -> ClassScores {
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|z| (z - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        let probabilities = exps.iter().map(|e| e / sum).collect();
        ClassScores { logits, probabilities }
    }

    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Highest-scoring class over the full vocabulary; ties go to the lower index.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, p) in self.probabilities.iter().enumerate() {
            if p.total_cmp(&self.probabilities[best]).is_gt() {
                best = i;
            }
        }
        best
    }

    /// The `k` highest-probability classes in descending order; ties go to
    /// the lower index. Both the prediction table and rank-based class
    /// selection read this ordering.
    pub fn top_k(&self, k: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.probabilities[b].total_cmp(&self.probabilities[a]));
        order.truncate(k);
        order
    }

    /// Gradient of the selected scalar w.r.t. the logits.
    pub fn score_gradient(&self, class_index: usize, target: ScoreTarget) -> Vec<f32> {
        match target {
            ScoreTarget::Logit => {
                let mut grad = vec![0.0; self.len()];
                grad[class_index] = 1.0;
                grad
            }
            ScoreTarget::Probability => {
                // ∂p_c/∂z_j = p_c (δ_cj − p_j)
                let pc = self.probabilities[class_index];
                self.probabilities
                    .iter()
                    .enumerate()
                    .map(|(j, &pj)| {
                        let delta = if j == class_index { 1.0 } else { 0.0 };
                        pc * (delta - pj)
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn probabilities_sum_to_one() {
        let s = ClassScores::from_logits(vec![1.0, 2.0, 3.0, 1000.0]);
        let total: f32 = s.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(s.probabilities.iter().all(|p| p.is_finite()));
    }

    #[rstest]
    fn ties_resolve_to_the_lower_index() {
        let s = ClassScores::from_logits(vec![0.0, 5.0, 5.0, 1.0]);
        assert_eq!(s.argmax(), 1);
        assert_eq!(s.top_k(3), vec![1, 2, 3]);
    }

    #[rstest]
    fn argmax_agrees_with_the_first_ranked_class() {
        let s = ClassScores::from_logits(vec![0.3, -1.0, 2.2, 2.1, 0.0, 0.7]);
        assert_eq!(s.top_k(1)[0], s.argmax());
    }

    #[rstest]
    fn probability_gradient_matches_finite_differences() {
        let logits = vec![0.5, -0.25, 1.0];
        let s = ClassScores::from_logits(logits.clone());
        let grad = s.score_gradient(2, ScoreTarget::Probability);
        let h = 1e-3;
        for j in 0..3 {
            let mut up = logits.clone();
            up[j] += h;
            let mut down = logits.clone();
            down[j] -= h;
            let numeric = (ClassScores::from_logits(up).probabilities[2]
                - ClassScores::from_logits(down).probabilities[2]) / (2.0 * h);
            assert!((numeric - grad[j]).abs() < 1e-3, "j={}: {} vs {}", j, numeric, grad[j]);
        }
    }
}
