//! Crop-pair sampling from the single input image.
//!
//! Purpose
//! - Draw, every iteration, one Generator crop and one real Discriminator
//!   crop from the same image, favouring textured regions.
//!
//! Design
//! - Importance maps come from [`gradient_map`]. The Generator's map is built
//!   on the image downscaled by the scale factor and brought back by
//!   nearest-neighbour upsampling, so it scores the content the Generator is
//!   asked to reproduce.
//! - Crop centres are drawn with `rand::distributions::WeightedIndex` over the
//!   flattened probability maps; the top-left corner is clamped into the
//!   image and snapped to even coordinates.
//! - The real crop receives `N(0, 1/255)` noise, mirroring the noise added to
//!   the Generator output during the Discriminator step.
pub mod gradient_map;

use crate::error::{EstimatorError, Result};
use crate::image::ImageF32;
use crate::resample::{downsample, upsample_nearest, BicubicFilter, Border};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::StandardNormal;

pub use gradient_map::{gradient_map, probability_map};

/// Border removed from synthetic inputs before sampling.
pub const SYNTHETIC_SHAVE: usize = 10;
/// Standard deviation of the noise added to crops fed to the Discriminator.
pub const CROP_NOISE_STD: f32 = 1.0 / 255.0;

/// One iteration's worth of training data.
#[derive(Clone, Debug)]
pub struct CropPair {
    /// `input_crop_size²` crop fed to the Generator.
    pub generator: ImageF32,
    /// Real crop of the Generator's output size fed to the Discriminator.
    pub discriminator: ImageF32,
}

/// Shave synthetic borders, trim the size to a multiple of the scale factor
/// and map intensities from `[0, 1]` to `[-1, 1]`.
pub fn prepare_input(image: &ImageF32, scale_factor: usize, real_image: bool) -> ImageF32 {
    let shave = if real_image { 0 } else { SYNTHETIC_SHAVE };
    let sf = scale_factor.max(1);
    let inner_w = image.w.saturating_sub(2 * shave);
    let inner_h = image.h.saturating_sub(2 * shave);
    let w = inner_w - inner_w % sf;
    let h = inner_h - inner_h % sf;
    let mut prepared = image.crop(shave.min(image.w), shave.min(image.h), w, h);
    for v in prepared.data.iter_mut() {
        *v = 2.0 * *v - 1.0;
    }
    prepared
}

#[derive(Clone, Debug)]
pub struct CropSampler {
    image: ImageF32,
    generator_size: usize,
    discriminator_size: usize,
    generator_centres: WeightedIndex<f64>,
    discriminator_centres: WeightedIndex<f64>,
}

impl CropSampler {
    /// Build the importance maps for an already prepared image.
    pub fn new(
        image: ImageF32,
        scale_factor: usize,
        generator_size: usize,
        discriminator_size: usize,
    ) -> Result<Self> {
        let needed = generator_size.max(discriminator_size);
        if image.w < needed || image.h < needed {
            return Err(EstimatorError::ShapeMismatch(format!(
                "image {}x{} is smaller than the {needed}px crops",
                image.w, image.h
            )));
        }
        let sf = scale_factor.max(1);

        let filter = BicubicFilter::new(sf);
        let small = downsample(&image, &filter, sf, filter.padding(), Border::Clamp);
        let small_map = gradient_map(&small);
        let upsampled = upsample_nearest(&small_map, sf);
        // Clamp-extend when the decimated grid does not tile the image exactly.
        let generator_map = ImageF32::from_fn(image.w, image.h, |x, y| {
            upsampled.get(
                x.min(upsampled.w.saturating_sub(1)),
                y.min(upsampled.h.saturating_sub(1)),
            )
        });
        let generator_probs = probability_map(&generator_map, generator_size);
        let discriminator_probs = probability_map(&gradient_map(&image), discriminator_size);

        Ok(Self {
            generator_centres: weighted_index(&generator_probs)?,
            discriminator_centres: weighted_index(&discriminator_probs)?,
            image,
            generator_size,
            discriminator_size,
        })
    }

    pub fn image(&self) -> &ImageF32 {
        &self.image
    }

    /// Draw a fresh crop pair.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> CropPair {
        let g_centre = self.generator_centres.sample(rng);
        let (left, top) = self.top_left(g_centre, self.generator_size);
        let generator = self
            .image
            .crop(left, top, self.generator_size, self.generator_size);

        let d_centre = self.discriminator_centres.sample(rng);
        let (left, top) = self.top_left(d_centre, self.discriminator_size);
        let mut discriminator =
            self.image
                .crop(left, top, self.discriminator_size, self.discriminator_size);
        add_noise(&mut discriminator, CROP_NOISE_STD, rng);

        CropPair {
            generator,
            discriminator,
        }
    }

    /// Top-left corner `(left, top)` of a `size` crop centred on the flattened
    /// index `centre`, clamped into the image and snapped to even coordinates.
    pub fn top_left(&self, centre: usize, size: usize) -> (usize, usize) {
        let row = centre / self.image.w;
        let col = centre % self.image.w;
        let top = row.saturating_sub(size / 2).min(self.image.h - size);
        let left = col.saturating_sub(size / 2).min(self.image.w - size);
        (left - left % 2, top - top % 2)
    }
}

/// Add i.i.d. Gaussian noise with standard deviation `std` to every pixel.
pub fn add_noise<R: Rng + ?Sized>(image: &mut ImageF32, std: f32, rng: &mut R) {
    for v in image.data.iter_mut() {
        let n: f32 = rng.sample(StandardNormal);
        *v += n * std;
    }
}

fn weighted_index(probs: &[f64]) -> Result<WeightedIndex<f64>> {
    WeightedIndex::new(probs.iter().copied())
        .map_err(|e| EstimatorError::InvalidConfig(format!("crop probability map: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn textured(w: usize, h: usize) -> ImageF32 {
        ImageF32::from_fn(w, h, |x, y| {
            (((x as f32) * 0.7).sin() * ((y as f32) * 0.45).cos() + 1.0) * 0.5
        })
    }

    #[test]
    fn prepare_input_shaves_and_trims() {
        let img = textured(57, 44);
        let prepared = prepare_input(&img, 2, false);
        assert_eq!((prepared.w, prepared.h), (36, 24));
        assert_eq!(prepared.get(0, 0), 2.0 * img.get(10, 10) - 1.0);
        let real = prepare_input(&img, 3, true);
        assert_eq!((real.w, real.h), (57, 42));
        assert_eq!(real.get(3, 5), 2.0 * img.get(3, 5) - 1.0);
    }

    #[test]
    fn crops_stay_inside_image_and_on_even_corners() {
        let sampler = CropSampler::new(textured(80, 72), 2, 32, 13).expect("sampler");
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let pair = sampler.sample(&mut rng);
            assert_eq!((pair.generator.w, pair.generator.h), (32, 32));
            assert_eq!((pair.discriminator.w, pair.discriminator.h), (13, 13));
        }
        for centre in [0usize, 79, 80 * 71 + 79, 80 * 36 + 40] {
            let (left, top) = sampler.top_left(centre, 32);
            assert!(left + 32 <= 80 && top + 32 <= 72);
            assert_eq!(left % 2, 0);
            assert_eq!(top % 2, 0);
        }
    }

    #[test]
    fn image_smaller_than_crop_is_rejected() {
        let err = CropSampler::new(textured(20, 20), 2, 32, 13).unwrap_err();
        assert!(matches!(err, EstimatorError::ShapeMismatch(_)));
    }
}
