//! Explicit downscaling kernels: extraction from a Generator, clean-up and
//! composition, file output.
//!
//! Purpose
//! - Hold the square kernel grid the whole crate passes around.
//! - Provide the geometric helpers shared by the constraint losses and the
//!   post-processing (sum, centre of mass, wanted centre).
//!
//! Notes
//! - Values are `f64`; the networks train in `f32` and convert at the
//!   extraction boundary.
//! - Centre of mass is `(row, col)` in index units, as an `nalgebra::Vector2`.
pub mod compose;
pub mod extract;
pub mod io;
pub mod postprocess;
pub mod shift;


use nalgebra::Vector2;
use ndarray::{s, Array2, Axis};

pub use compose::compose_kernel;
pub use extract::{extract_kernel, extract_kernel_traced, ExtractionTrace};
pub use postprocess::{post_process, threshold_significant, EstimatedKernels, PostProcessOptions};
pub use shift::recenter;

#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    values: Array2<f64>,
}

impl Kernel {
    pub fn new(values: Array2<f64>) -> Self {
        Self { values }
    }

    pub fn from_fn(size: usize, f: impl FnMut((usize, usize)) -> f64) -> Self {
        Self::new(Array2::from_shape_fn((size, size), f))
    }

    /// Isotropic Gaussian of the given side and standard deviation, centred
    /// on the grid centre and normalised to sum one.
    pub fn gaussian(size: usize, sigma: f64) -> Self {
        let c = (size as f64 - 1.0) / 2.0;
        let mut k = Self::from_fn(size, |(r, col)| {
            let dr = r as f64 - c;
            let dc = col as f64 - c;
            (-(dr * dr + dc * dc) / (2.0 * sigma * sigma)).exp()
        });
        let total = k.sum();
        if total > 0.0 {
            k.values.mapv_inplace(|v| v / total);
        }
        k
    }

    /// Side length (kernels are square).
    pub fn size(&self) -> usize {
        self.values.nrows()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn into_array(self) -> Array2<f64> {
        self.values
    }

    pub fn sum(&self) -> f64 {
        self.values.sum()
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Centre of mass `(row, col)`, or `None` when the kernel has no mass.
    pub fn center_of_mass(&self) -> Option<Vector2<f64>> {
        let total = self.sum();
        if total.abs() < f64::EPSILON || !total.is_finite() {
            return None;
        }
        let rows = self.values.sum_axis(Axis(1));
        let cols = self.values.sum_axis(Axis(0));
        let weighted = |line: &ndarray::Array1<f64>| {
            line.iter()
                .enumerate()
                .map(|(i, v)| i as f64 * v)
                .sum::<f64>()
                / total
        };
        Some(Vector2::new(weighted(&rows), weighted(&cols)))
    }

    /// Centre of mass a kernel of side `size` should have for `scale_factor`:
    /// `size//2 + 0.5·(sf − size mod 2)` on both axes.
    pub fn wanted_center(size: usize, scale_factor: usize) -> f64 {
        (size / 2) as f64 + 0.5 * (scale_factor as f64 - (size % 2) as f64)
    }

    /// Both axes reversed.
    pub fn flipped(&self) -> Self {
        Self::new(self.values.slice(s![..;-1, ..;-1]).to_owned())
    }

    /// Cosine similarity of the flattened grids. Kernels of different sides
    /// are compared on the larger one's centred crop.
    pub fn cosine_similarity(&self, other: &Kernel) -> f64 {
        let n = self.size().min(other.size());
        let a = centre_crop(&self.values, n);
        let b = centre_crop(&other.values, n);
        let dot = (&a * &b).sum();
        let norm = (a.mapv(|v| v * v).sum() * b.mapv(|v| v * v).sum()).sqrt();
        if norm > 0.0 {
            dot / norm
        } else {
            0.0
        }
    }

    pub fn to_f32(&self) -> Array2<f32> {
        self.values.mapv(|v| v as f32)
    }
}

fn centre_crop(values: &Array2<f64>, n: usize) -> Array2<f64> {
    let off = (values.nrows() - n) / 2;
    values.slice(s![off..off + n, off..off + n]).to_owned()
}

impl From<Array2<f64>> for Kernel {
    fn from(values: Array2<f64>) -> Self {
        Self::new(values)
    }
}

impl From<&Array2<f32>> for Kernel {
    fn from(values: &Array2<f32>) -> Self {
        Self::new(values.mapv(f64::from))
    }
}

impl From<Kernel> for Array2<f64> {
    fn from(kernel: Kernel) -> Self {
        kernel.values
    }
}
