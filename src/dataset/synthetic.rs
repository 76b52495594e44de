//! Synthetic multi-label datasets
//!
//! Generates stores with the exact layout the handler expects, for smoke
//! runs of the CLI and for tests. Class frequencies are skewed (low class
//! indices are common, high ones rare) to resemble real multi-label corpora.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::labels::LabelMatrix;
use crate::dataset::store::{Collection, MemoryStore, MEAN_KEY};
use crate::dataset::{DatasetId, ImageGeometry, Split, CHANNELS};
use crate::utils::error::Result;

/// How image pixels are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFill {
    /// Uniform noise in [0, 255), mean computed from the training images
    Random,
    /// Every pixel of example `i` equals `i`, mean is all zeros
    ExampleIndex,
}

/// Shape of a synthetic dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticSpec {
    pub dataset: DatasetId,
    pub geometry: ImageGeometry,
    pub train_examples: usize,
    pub val_examples: usize,
    pub pixel_fill: PixelFill,
}

impl SyntheticSpec {
    pub fn new(dataset: DatasetId, train_examples: usize, val_examples: usize) -> Self {
        Self {
            dataset,
            geometry: ImageGeometry::square(8),
            train_examples,
            val_examples,
            pixel_fill: PixelFill::Random,
        }
    }

    pub fn with_geometry(mut self, geometry: ImageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_pixel_fill(mut self, pixel_fill: PixelFill) -> Self {
        self.pixel_fill = pixel_fill;
        self
    }
}

/// Random binary labels with one to three positive classes per example
pub fn random_labels<R: Rng + ?Sized>(
    num_examples: usize,
    num_classes: usize,
    rng: &mut R,
) -> LabelMatrix {
    let mut labels = LabelMatrix::zeros(num_examples, num_classes);
    for row in 0..num_examples {
        let positives = rng.gen_range(1..=3);
        for _ in 0..positives {
            let u: f64 = rng.gen();
            let class = ((u * u * num_classes as f64) as usize).min(num_classes - 1);
            labels.row_mut(row)[class] = 1.0;
        }
    }
    labels
}

/// Every key a synthetic store carries for `dataset`
pub fn store_keys(dataset: DatasetId) -> Vec<String> {
    let mut keys = Vec::new();
    for split in [Split::Train, Split::Validation] {
        for collection in Collection::ALL {
            keys.push(collection.key(dataset.split_name(split)));
        }
    }
    keys.push(MEAN_KEY.to_string());
    keys
}

/// Build an in-memory store following `spec`
pub fn build_store<R: Rng + ?Sized>(spec: &SyntheticSpec, rng: &mut R) -> Result<MemoryStore> {
    let geometry = spec.geometry;
    let pixel_len = geometry.pixel_len();
    let num_classes = spec.dataset.num_classes();
    let mut store = MemoryStore::new();
    let mut mean = vec![0.0f32; pixel_len];

    for (split, count) in [
        (Split::Train, spec.train_examples),
        (Split::Validation, spec.val_examples),
    ] {
        let prefix = spec.dataset.split_name(split);

        let mut images = Vec::with_capacity(count * pixel_len);
        for example in 0..count {
            match spec.pixel_fill {
                PixelFill::Random => {
                    images.extend((0..pixel_len).map(|_| rng.gen_range(0.0f32..255.0)))
                }
                PixelFill::ExampleIndex => {
                    images.extend(std::iter::repeat(example as f32).take(pixel_len))
                }
            }
        }

        if split == Split::Train && spec.pixel_fill == PixelFill::Random && count > 0 {
            for image in images.chunks_exact(pixel_len) {
                for (m, &value) in mean.iter_mut().zip(image) {
                    *m += value;
                }
            }
            for m in mean.iter_mut() {
                *m /= count as f32;
            }
        }

        let shapes: Vec<f32> = (0..count)
            .flat_map(|_| [geometry.height as f32, geometry.width as f32, CHANNELS as f32])
            .collect();

        store.insert(Collection::Images.key(prefix), vec![count, pixel_len], images)?;
        store.insert(Collection::ImageShapes.key(prefix), vec![count, CHANNELS], shapes)?;
        store.insert_labels(
            Collection::Labels.key(prefix),
            &random_labels(count, num_classes, rng),
        )?;
    }

    store.insert(
        MEAN_KEY,
        vec![geometry.height, geometry.width, CHANNELS],
        mean,
    )?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::store::DatasetStore;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_random_labels_have_positives() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let labels = random_labels(200, 80, &mut rng);
        for row in 0..200 {
            assert!(labels.row(row).iter().any(|&v| v == 1.0));
        }
        // skew: class 0 is more frequent than the last class
        let counts = labels.class_counts();
        assert!(counts[0] > counts[79]);
    }

    #[test]
    fn test_build_store_layout() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let spec = SyntheticSpec::new(DatasetId::NusWide, 12, 4)
            .with_geometry(ImageGeometry::new(4, 6));
        let store = build_store(&spec, &mut rng).unwrap();

        assert_eq!(store.shape("train_images").unwrap(), vec![12, 72]);
        assert_eq!(store.shape("test_labels").unwrap(), vec![4, 81]);
        assert_eq!(store.shape("test_image_shapes").unwrap(), vec![4, 3]);
        assert_eq!(store.shape(MEAN_KEY).unwrap(), vec![4, 6, 3]);
        assert_eq!(store.keys().len(), store_keys(DatasetId::NusWide).len());
    }

    #[test]
    fn test_example_index_fill() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let spec =
            SyntheticSpec::new(DatasetId::MsCoco, 3, 2).with_pixel_fill(PixelFill::ExampleIndex);
        let store = build_store(&spec, &mut rng).unwrap();

        let row = store.read_rows("train_images", &[2]).unwrap();
        assert!(row.iter().all(|&v| v == 2.0));
        assert!(store.read_all(MEAN_KEY).unwrap().iter().all(|&v| v == 0.0));
    }
}
