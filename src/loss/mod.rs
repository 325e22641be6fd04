//! Generator and Discriminator objectives.
//!
//! - [`adversarial`]: L1 distance between patch probabilities and the label.
//! - [`downscale`]: bicubic consistency on the Generator output.
//! - [`kernel_terms`]: constraints evaluated on the extracted kernel.
//!
//! [`ConstraintSuite`] bundles the kernel constraints with their coefficients
//! and produces both the weighted sum and the gradient w.r.t. the kernel.
pub mod adversarial;
pub mod downscale;
pub mod kernel_terms;

pub use adversarial::{adversarial_loss, Label};
pub use downscale::BicubicConsistency;
pub use kernel_terms::{sparsity, sum_to_one, BoundaryPenalty, CenterPenalty};

use crate::config::LossCoefficients;
use crate::kernel::Kernel;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Value of one constraint and its gradient w.r.t. the kernel.
#[derive(Clone, Debug)]
pub struct TermValue {
    pub value: f64,
    pub grad: Array2<f64>,
}

/// Unweighted constraint values of one Generator step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintValues {
    pub bicubic: f32,
    pub sum2one: f64,
    pub boundaries: f64,
    pub centralized: f64,
    pub sparse: f64,
}

impl ConstraintValues {
    /// Weighted sum with the given coefficients.
    pub fn weighted(&self, c: &LossCoefficients) -> f64 {
        c.bicubic as f64 * self.bicubic as f64
            + c.sum2one as f64 * self.sum2one
            + c.boundaries as f64 * self.boundaries
            + c.centralized as f64 * self.centralized
            + c.sparse as f64 * self.sparse
    }

    /// First non-finite term, if any.
    pub fn non_finite_term(&self) -> Option<&'static str> {
        if !self.bicubic.is_finite() {
            Some("bicubic")
        } else if !self.sum2one.is_finite() {
            Some("sum2one")
        } else if !self.boundaries.is_finite() {
            Some("boundaries")
        } else if !self.centralized.is_finite() {
            Some("centralized")
        } else if !self.sparse.is_finite() {
            Some("sparse")
        } else {
            None
        }
    }
}

/// Kernel-space constraints sized for one kernel side and scale factor.
#[derive(Clone, Debug)]
pub struct ConstraintSuite {
    boundaries: BoundaryPenalty,
    centralized: CenterPenalty,
}

impl ConstraintSuite {
    pub fn new(kernel_size: usize, scale_factor: usize) -> Self {
        Self {
            boundaries: BoundaryPenalty::new(kernel_size),
            centralized: CenterPenalty::new(kernel_size, scale_factor),
        }
    }

    /// Evaluate every kernel constraint. Returns the raw values (the bicubic
    /// slot is left at zero) and `Σ λ_i ∇term_i`.
    pub fn evaluate(
        &self,
        kernel: &Kernel,
        coefficients: &LossCoefficients,
    ) -> (ConstraintValues, Array2<f64>) {
        let terms = [
            (coefficients.sum2one, sum_to_one(kernel)),
            (coefficients.boundaries, self.boundaries.evaluate(kernel)),
            (coefficients.centralized, self.centralized.evaluate(kernel)),
            (coefficients.sparse, sparsity(kernel)),
        ];
        let mut grad = Array2::<f64>::zeros(kernel.values().raw_dim());
        for (lambda, term) in terms.iter() {
            if *lambda != 0.0 {
                grad.scaled_add(*lambda as f64, &term.grad);
            }
        }
        let [sum2one, boundaries, centralized, sparse] = terms.map(|(_, t)| t.value);
        let values = ConstraintValues {
            bicubic: 0.0,
            sum2one,
            boundaries,
            centralized,
            sparse,
        };
        (values, grad)
    }
}
