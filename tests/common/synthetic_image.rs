pub use kernel_estimator::synthetic::{gaussian_degraded, scene};

use kernel_estimator::image::ImageF32;

/// 200px scene blurred with a σ = 1.5 Gaussian and halved.
pub fn degraded_scene() -> ImageF32 {
    gaussian_degraded(&scene(200, 3), 13, 1.5, 2).0
}
