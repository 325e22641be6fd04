/// Trait implemented by separable 1D filters used for strided resampling.
pub trait SeparableFilter {
    /// Return the 1D taps (in left-to-right order). The kernel is assumed to be
    /// symmetric around its centre, but the implementation does not rely on it.
    fn taps(&self) -> &[f32];
}

/// Antialiasing bicubic filter (Keys, `a = -0.5`) for integer downscaling.
///
/// For a factor `s` the filter spans `4·s` taps placed at
/// `(i - (4s - 1) / 2) / s` and scaled by `1 / s`, so the taps sum to one.
/// The outer product of the ×2 taps is the classic 8×8 reference table used
/// to anchor the estimated kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct BicubicFilter {
    factor: usize,
    taps: Vec<f32>,
}

impl BicubicFilter {
    pub fn new(factor: usize) -> Self {
        let factor = factor.max(1);
        let len = 4 * factor;
        let centre = (len as f64 - 1.0) / 2.0;
        let taps = (0..len)
            .map(|i| (cubic((i as f64 - centre) / factor as f64) / factor as f64) as f32)
            .collect();
        Self { factor, taps }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Zero padding that keeps the filter centred on the decimated grid.
    pub fn padding(&self) -> usize {
        (self.taps.len() - 1) / 2
    }
}

impl SeparableFilter for BicubicFilter {
    #[inline]
    fn taps(&self) -> &[f32] {
        &self.taps
    }
}

/// Keys cubic convolution kernel with `a = -0.5`.
pub fn cubic(x: f64) -> f64 {
    let ax = x.abs();
    let ax2 = ax * ax;
    let ax3 = ax2 * ax;
    if ax <= 1.0 {
        1.5 * ax3 - 2.5 * ax2 + 1.0
    } else if ax <= 2.0 {
        -0.5 * ax3 + 2.5 * ax2 - 4.0 * ax + 2.0
    } else {
        0.0
    }
}
