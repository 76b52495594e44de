//! Augmentation gateway
//!
//! Every image pulled from the store passes through one of two transforms
//! before it is stacked into a batch:
//!
//! - **Augmenting**: random horizontal flip, random width/height shift, random
//!   zoom (constant fill outside the source), then mean centering
//! - **Plain**: mean centering only
//!
//! Both operate on flattened HxWx3 (channel-last) f32 images and require the
//! dataset-wide mean to be set first. The affine part samples the source
//! image around its centre with bilinear interpolation.

use std::sync::Arc;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::dataset::{ImageGeometry, CHANNELS};
use crate::utils::error::{Result, SslDataError};

/// Configuration of the random geometric transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Probability of mirroring the columns
    pub horizontal_flip_prob: f32,
    /// Maximum shift along the width, as a fraction of the width
    pub width_shift: f32,
    /// Maximum shift along the height, as a fraction of the height
    pub height_shift: f32,
    /// Zoom factors are drawn from [1 - zoom_range, 1 + zoom_range] per axis
    pub zoom_range: f32,
    /// Value written where the transform samples outside the source
    pub fill_value: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self::keras_default()
    }
}

impl AugmentationConfig {
    /// Flip, 1/8 shifts and 1/8 zoom with zero fill
    pub fn keras_default() -> Self {
        Self {
            horizontal_flip_prob: 0.5,
            width_shift: 1.0 / 8.0,
            height_shift: 1.0 / 8.0,
            zoom_range: 1.0 / 8.0,
            fill_value: 0.0,
        }
    }

    /// No geometric augmentation
    pub fn none() -> Self {
        Self {
            horizontal_flip_prob: 0.0,
            width_shift: 0.0,
            height_shift: 0.0,
            zoom_range: 0.0,
            fill_value: 0.0,
        }
    }

    /// Whether any random geometric transform is enabled
    pub fn is_enabled(&self) -> bool {
        self.horizontal_flip_prob > 0.0
            || self.width_shift > 0.0
            || self.height_shift > 0.0
            || self.zoom_range > 0.0
    }
}

/// Per-image transform applied during batch materialization
///
/// Input and output are flattened HxWx3 images of identical length.
pub trait ImageTransform: Send + Sync {
    fn transform(
        &self,
        image: Vec<f32>,
        geometry: ImageGeometry,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f32>>;
}

/// Mean-centering preprocessor with optional random augmentation
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: AugmentationConfig,
    mean: Option<Arc<[f32]>>,
}

impl Preprocessor {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config, mean: None }
    }

    /// Mean centering only
    pub fn plain() -> Self {
        Self::new(AugmentationConfig::none())
    }

    /// Flip/shift/zoom followed by mean centering
    pub fn augmenting() -> Self {
        Self::new(AugmentationConfig::keras_default())
    }

    pub fn with_mean(mut self, mean: Arc<[f32]>) -> Self {
        self.mean = Some(mean);
        self
    }

    pub fn set_mean(&mut self, mean: Arc<[f32]>) {
        self.mean = Some(mean);
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    fn random_affine(
        &self,
        image: &[f32],
        geometry: ImageGeometry,
        rng: &mut dyn RngCore,
    ) -> Vec<f32> {
        let (h, w) = (geometry.height, geometry.width);
        let c = &self.config;

        let tx = uniform(rng, c.height_shift) * h as f32;
        let ty = uniform(rng, c.width_shift) * w as f32;
        let zx = 1.0 + uniform(rng, c.zoom_range);
        let zy = 1.0 + uniform(rng, c.zoom_range);
        let flip = rng.gen::<f32>() < c.horizontal_flip_prob;

        let center_r = h as f32 / 2.0 - 0.5;
        let center_c = w as f32 / 2.0 - 0.5;

        let mut out = vec![c.fill_value; image.len()];
        for r in 0..h {
            let src_r = zx * (r as f32 - center_r) + center_r + tx;
            for col in 0..w {
                let src_c = zy * (col as f32 - center_c) + center_c + ty;
                let dst_col = if flip { w - 1 - col } else { col };
                let dst = (r * w + dst_col) * CHANNELS;
                bilinear_sample(image, geometry, src_r, src_c, &mut out[dst..dst + CHANNELS]);
            }
        }
        out
    }
}

impl ImageTransform for Preprocessor {
    fn transform(
        &self,
        image: Vec<f32>,
        geometry: ImageGeometry,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f32>> {
        let mean = self
            .mean
            .as_ref()
            .ok_or_else(|| SslDataError::config("preprocessor mean must be set before use"))?;
        if image.len() != geometry.pixel_len() || mean.len() != image.len() {
            return Err(SslDataError::config(format!(
                "image of {} values and mean of {} values do not match {}x{}x{}",
                image.len(),
                mean.len(),
                geometry.height,
                geometry.width,
                CHANNELS
            )));
        }

        let mut out = if self.config.is_enabled() {
            self.random_affine(&image, geometry, rng)
        } else {
            image
        };
        for (value, m) in out.iter_mut().zip(mean.iter()) {
            *value -= m;
        }
        Ok(out)
    }
}

/// Uniform draw in [-range, range], 0 when disabled
fn uniform(rng: &mut dyn RngCore, range: f32) -> f32 {
    if range > 0.0 {
        rng.gen_range(-range..=range)
    } else {
        0.0
    }
}

/// Bilinear sample at (row, col); leaves `out` untouched (fill) outside the image
fn bilinear_sample(image: &[f32], geometry: ImageGeometry, row: f32, col: f32, out: &mut [f32]) {
    let (h, w) = (geometry.height, geometry.width);
    if row < 0.0 || col < 0.0 || row > (h - 1) as f32 || col > (w - 1) as f32 {
        return;
    }

    let r0 = row.floor() as usize;
    let c0 = col.floor() as usize;
    let r1 = (r0 + 1).min(h - 1);
    let c1 = (c0 + 1).min(w - 1);
    let fr = row - r0 as f32;
    let fc = col - c0 as f32;

    let at = |r: usize, c: usize, ch: usize| image[(r * w + c) * CHANNELS + ch];
    for (ch, value) in out.iter_mut().enumerate() {
        *value = at(r0, c0, ch) * (1.0 - fr) * (1.0 - fc)
            + at(r0, c1, ch) * (1.0 - fr) * fc
            + at(r1, c0, ch) * fr * (1.0 - fc)
            + at(r1, c1, ch) * fr * fc;
    }
}
