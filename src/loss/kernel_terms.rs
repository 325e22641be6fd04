//! Physical constraints evaluated directly on the extracted kernel.
use super::TermValue;
use crate::kernel::Kernel;
use ndarray::Array2;

/// Peak value of the boundary penalty mask.
pub const BOUNDARY_PENALTY: f64 = 30.0;
/// Keeps the sparsity gradient finite at zero.
pub const SPARSITY_EPS: f64 = 1e-6;

/// `(Σk − 1)²`: the kernel must neither brighten nor darken the image.
pub fn sum_to_one(kernel: &Kernel) -> TermValue {
    let excess = kernel.sum() - 1.0;
    TermValue {
        value: excess * excess,
        grad: Array2::from_elem(kernel.values().raw_dim(), 2.0 * excess),
    }
}

/// `Σ sqrt(|k| + ε)`, favouring few significant entries.
pub fn sparsity(kernel: &Kernel) -> TermValue {
    let k = kernel.values();
    let value = k.iter().map(|v| (v.abs() + SPARSITY_EPS).sqrt()).sum();
    let grad = k.mapv(|v| {
        if v == 0.0 {
            0.0
        } else {
            0.5 * v.signum() / (v.abs() + SPARSITY_EPS).sqrt()
        }
    });
    TermValue { value, grad }
}

/// Penalty on mass far from the kernel centre.
#[derive(Clone, Debug)]
pub struct BoundaryPenalty {
    mask: Array2<f64>,
}

impl BoundaryPenalty {
    /// Mask `30·(1 − g/max g)` for a Gaussian `g` with σ equal to the kernel
    /// side, with a central square left unpenalised.
    pub fn new(size: usize) -> Self {
        Self {
            mask: penalty_mask(size, BOUNDARY_PENALTY),
        }
    }

    pub fn mask(&self) -> &Array2<f64> {
        &self.mask
    }

    /// `mean(|k ⊙ mask|)`.
    pub fn evaluate(&self, kernel: &Kernel) -> TermValue {
        let k = kernel.values();
        let n = k.len().max(1) as f64;
        let value = k
            .iter()
            .zip(self.mask.iter())
            .map(|(v, m)| (v * m).abs())
            .sum::<f64>()
            / n;
        let grad = Array2::from_shape_fn(k.raw_dim(), |idx| {
            let (v, m) = (k[idx], self.mask[idx]);
            if v * m == 0.0 {
                0.0
            } else {
                v.signum() * m.abs() / n
            }
        });
        TermValue { value, grad }
    }
}

fn gaussian_profile(size: usize, sigma: f64) -> Vec<f64> {
    // Offsets run over floor(-size/2)+1 ..= size/2.
    let start = (-(size as i64)).div_euclid(2) + 1;
    let norm = (2.0 * std::f64::consts::PI * sigma * sigma).sqrt();
    (0..size as i64)
        .map(|i| {
            let z = (start + i) as f64;
            (-z * z / (2.0 * sigma * sigma)).exp() / norm
        })
        .collect()
}

fn penalty_mask(size: usize, scale: f64) -> Array2<f64> {
    let profile = gaussian_profile(size, size as f64);
    let gauss = Array2::from_shape_fn((size, size), |(r, c)| profile[r] * profile[c]);
    let peak = gauss.iter().copied().fold(0.0f64, f64::max);
    let mut mask = gauss.mapv(|g| if peak > 0.0 { 1.0 - g / peak } else { 0.0 });

    let center_size = size / 2 + size % 2;
    let margin = (size as i64 - center_size as i64) / 2 - 1;
    if margin > 0 {
        let m = margin as usize;
        for r in m..size - m {
            for c in m..size - m {
                mask[[r, c]] = 0.0;
            }
        }
    }
    mask.mapv_inplace(|v| v * scale);
    mask
}

/// Mean squared distance of the centre of mass from the wanted centre.
#[derive(Clone, Debug)]
pub struct CenterPenalty {
    wanted: f64,
}

impl CenterPenalty {
    pub fn new(size: usize, scale_factor: usize) -> Self {
        Self {
            wanted: Kernel::wanted_center(size, scale_factor),
        }
    }

    pub fn wanted(&self) -> f64 {
        self.wanted
    }

    /// `((com_r − c)² + (com_c − c)²) / 2`.
    pub fn evaluate(&self, kernel: &Kernel) -> TermValue {
        let k = kernel.values();
        let Some(com) = kernel.center_of_mass() else {
            return TermValue {
                value: 0.0,
                grad: Array2::zeros(k.raw_dim()),
            };
        };
        let total = kernel.sum();
        let (dr, dc) = (com.x - self.wanted, com.y - self.wanted);
        let value = (dr * dr + dc * dc) / 2.0;
        let grad = Array2::from_shape_fn(k.raw_dim(), |(i, j)| {
            dr * (i as f64 - com.x) / total + dc * (j as f64 - com.y) / total
        });
        TermValue { value, grad }
    }
}
