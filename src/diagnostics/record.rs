use crate::error::Result;
use crate::image::io::write_json_file;
use crate::loss::ConstraintValues;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Losses of one training iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationLosses {
    pub iteration: usize,
    /// Adversarial term plus the weighted constraints.
    pub generator_total: f64,
    pub adversarial: f32,
    pub discriminator_real: f32,
    pub discriminator_fake: f32,
    pub constraints: ConstraintValues,
}

impl IterationLosses {
    pub fn bicubic(&self) -> f32 {
        self.constraints.bicubic
    }

    /// Name of the first non-finite loss, if any.
    pub fn non_finite_term(&self) -> Option<&'static str> {
        if !self.adversarial.is_finite() {
            Some("adversarial")
        } else if let Some(term) = self.constraints.non_finite_term() {
            Some(term)
        } else if !self.generator_total.is_finite() {
            Some("generator_total")
        } else if !self.discriminator_real.is_finite() {
            Some("discriminator_real")
        } else if !self.discriminator_fake.is_finite() {
            Some("discriminator_fake")
        } else {
            None
        }
    }
}

/// Loss history of a run, in iteration order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRecord {
    pub iterations: Vec<IterationLosses>,
}

impl TrainingRecord {
    pub fn push(&mut self, losses: IterationLosses) {
        self.iterations.push(losses);
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    pub fn last(&self) -> Option<&IterationLosses> {
        self.iterations.last()
    }

    pub fn generator_totals(&self) -> Vec<f64> {
        self.iterations.iter().map(|l| l.generator_total).collect()
    }

    pub fn bicubic(&self) -> Vec<f32> {
        self.iterations.iter().map(IterationLosses::bicubic).collect()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        write_json_file(path, self)
    }
}
