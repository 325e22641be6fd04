//! Weight initialisers.
use ndarray::{Array1, Array4};
use rand::Rng;
use rand_distr::StandardNormal;

/// Gain applied by both networks to their Xavier-normal convolution weights.
pub const SMALL_GAIN: f32 = 0.1;

/// Xavier (Glorot) normal init for a `[out, in, k, k]` convolution weight:
/// `std = gain · sqrt(2 / (fan_in + fan_out))` with `fan = channels · k²`.
pub fn xavier_normal<R: Rng + ?Sized>(
    out_channels: usize,
    in_channels: usize,
    kernel: usize,
    gain: f32,
    rng: &mut R,
) -> Array4<f32> {
    let receptive = (kernel * kernel) as f32;
    let fan_in = in_channels as f32 * receptive;
    let fan_out = out_channels as f32 * receptive;
    let std = gain * (2.0 / (fan_in + fan_out)).sqrt();
    Array4::from_shape_fn((out_channels, in_channels, kernel, kernel), |_| {
        let n: f32 = rng.sample(StandardNormal);
        n * std
    })
}

/// `len` samples from `N(mean, std²)`.
pub fn normal<R: Rng + ?Sized>(len: usize, mean: f32, std: f32, rng: &mut R) -> Array1<f32> {
    Array1::from_shape_fn(len, |_| {
        let n: f32 = rng.sample(StandardNormal);
        mean + n * std
    })
}
