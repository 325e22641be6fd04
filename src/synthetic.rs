//! Procedural scenes and known-kernel degradations for demos and tests.
use crate::image::ImageF32;
use crate::kernel::Kernel;
use crate::resample::kernel_downscale;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Piecewise-constant scene of random disks and oriented bars on a mid-gray
/// background, so that edges of every orientation are present.
pub fn scene(size: usize, seed: u64) -> ImageF32 {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = ImageF32::from_fn(size, size, |_, _| 0.5);
    let s = size as f32;
    for _ in 0..(size / 4).max(8) {
        let (cx, cy) = (rng.gen_range(0.0..s), rng.gen_range(0.0..s));
        let value: f32 = rng.gen_range(0.05..0.95);
        if rng.gen_bool(0.5) {
            let radius = rng.gen_range(2.0..(s / 8.0).max(3.0));
            fill(&mut img, value, |x, y| (x - cx).hypot(y - cy) < radius);
        } else {
            let angle: f32 = rng.gen_range(0.0..std::f32::consts::PI);
            let half_len = rng.gen_range(6.0..(s / 3.0).max(7.0));
            let half_width = rng.gen_range(1.5..5.0);
            let (dx, dy) = (angle.cos(), angle.sin());
            fill(&mut img, value, |x, y| {
                let along = (x - cx) * dx + (y - cy) * dy;
                let across = -(x - cx) * dy + (y - cy) * dx;
                along.abs() < half_len && across.abs() < half_width
            });
        }
    }
    img
}

/// Blur `hr` with a normalised Gaussian of side `kernel_size` and decimate by
/// `scale_factor`. Returns the degraded image and the kernel used.
pub fn gaussian_degraded(
    hr: &ImageF32,
    kernel_size: usize,
    sigma: f64,
    scale_factor: usize,
) -> (ImageF32, Kernel) {
    let kernel = Kernel::gaussian(kernel_size, sigma);
    (kernel_downscale(hr, &kernel, scale_factor), kernel)
}

fn fill(img: &mut ImageF32, value: f32, inside: impl Fn(f32, f32) -> bool) {
    for y in 0..img.h {
        for x in 0..img.w {
            if inside(x as f32 + 0.5, y as f32 + 0.5) {
                img.set(x, y, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_is_seeded_and_textured() {
        let a = scene(64, 5);
        assert_eq!(a, scene(64, 5));
        assert_ne!(a, scene(64, 6));
        assert!(a.data.iter().any(|&v| v != 0.5));
        assert!(a.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn degradation_halves_the_size() {
        let (lr, kernel) = gaussian_degraded(&scene(64, 1), 13, 1.5, 2);
        assert_eq!((lr.w, lr.h), (32, 32));
        assert!((kernel.sum() - 1.0).abs() < 1e-9);
    }
}
