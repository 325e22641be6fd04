use crate::nn::sigmoid;
use ndarray::{Array2, ArrayView2};

/// Target of the patch judgement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Label {
    Real,
    Fake,
}

impl Label {
    fn value(self) -> f32 {
        match self {
            Label::Real => 1.0,
            Label::Fake => 0.0,
        }
    }
}

/// Mean absolute difference between `sigmoid(logits)` and the label over the
/// whole patch map, with its gradient w.r.t. the logits.
pub fn adversarial_loss(logits: ArrayView2<f32>, label: Label) -> (f32, Array2<f32>) {
    let target = label.value();
    let n = logits.len().max(1) as f32;
    let mut value = 0.0f32;
    let grad = logits.mapv(|x| {
        let p = sigmoid(x);
        let diff = p - target;
        value += diff.abs();
        let sign = if diff > 0.0 {
            1.0
        } else if diff < 0.0 {
            -1.0
        } else {
            0.0
        };
        sign * p * (1.0 - p) / n
    });
    (value / n, grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn confident_correct_logits_have_small_loss() {
        let logits = arr2(&[[8.0f32, 9.0], [10.0, 7.5]]);
        let (real, _) = adversarial_loss(logits.view(), Label::Real);
        let (fake, _) = adversarial_loss(logits.view(), Label::Fake);
        assert!(real < 1e-3);
        assert!(fake > 0.999);
    }

    #[test]
    fn gradient_pushes_towards_label() {
        let logits = arr2(&[[0.0f32, 0.5]]);
        let (value, grad) = adversarial_loss(logits.view(), Label::Real);
        assert!((value - (0.5 + (1.0 - sigmoid(0.5))) / 2.0).abs() < 1e-6);
        // Increasing logits lowers the loss when the label is real.
        assert!(grad.iter().all(|&g| g < 0.0));
        assert!((grad[[0, 0]] + 0.25 / 2.0).abs() < 1e-6);
    }
}
