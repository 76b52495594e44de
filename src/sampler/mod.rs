//! Batch sampling
//!
//! Infinite, pull-based batch streams over the partitioned training split and
//! the evaluation split. A stream is requested with a [`BatchRequest`]
//! `(mode, augment, shuffle_batches)` and yields [`Batch`]es of exactly
//! `batch_size` examples until the caller stops pulling.
//!
//! ## Modes
//!
//! | mode                   | index space             | labels                |
//! |------------------------|-------------------------|-----------------------|
//! | `train_all`            | whole training split    | training labels       |
//! | `train_labeled`        | labeled set             | training labels       |
//! | `train_labeled_sorted` | labeled set, ascending  | training labels       |
//! | `train_unlabeled`      | unlabeled set           | training labels       |
//! | `val`                  | evaluation split        | evaluation labels     |
//! | `train_mixed`          | labeled ++ unlabeled    | mixed labels (C + 1)  |

pub mod burn_batch;
pub mod indices;
pub mod mixed_labels;
pub mod strategy;
mod stream;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::{ImageGeometry, CHANNELS};
use crate::utils::error::SslDataError;

pub use burn_batch::TensorBatch;
pub use mixed_labels::{MixedLabelChannel, MixedLabelSnapshot};
pub use strategy::{SamplingContext, SamplingStrategy};
pub use stream::BatchStream;

/// Closed set of sampling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    TrainAll,
    TrainLabeled,
    TrainLabeledSorted,
    TrainUnlabeled,
    Val,
    TrainMixed,
}

impl SamplingMode {
    pub const ALL: [SamplingMode; 6] = [
        SamplingMode::TrainAll,
        SamplingMode::TrainLabeled,
        SamplingMode::TrainLabeledSorted,
        SamplingMode::TrainUnlabeled,
        SamplingMode::Val,
        SamplingMode::TrainMixed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SamplingMode::TrainAll => "train_all",
            SamplingMode::TrainLabeled => "train_labeled",
            SamplingMode::TrainLabeledSorted => "train_labeled_sorted",
            SamplingMode::TrainUnlabeled => "train_unlabeled",
            SamplingMode::Val => "val",
            SamplingMode::TrainMixed => "train_mixed",
        }
    }

    /// Fresh strategy implementing this mode
    pub fn strategy(&self) -> Box<dyn SamplingStrategy> {
        match self {
            SamplingMode::TrainAll => Box::new(strategy::TrainAll),
            SamplingMode::TrainLabeled => Box::new(strategy::TrainLabeled),
            SamplingMode::TrainLabeledSorted => Box::new(strategy::TrainLabeledSorted),
            SamplingMode::TrainUnlabeled => Box::new(strategy::TrainUnlabeled),
            SamplingMode::Val => Box::new(strategy::Validation),
            SamplingMode::TrainMixed => Box::<strategy::TrainMixed>::default(),
        }
    }
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SamplingMode {
    type Err = SslDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SamplingMode::ALL
            .into_iter()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| SslDataError::config(format!("unknown sampling mode '{}'", s)))
    }
}

/// What a stream produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub mode: SamplingMode,
    /// Use the augmenting transform instead of the plain one
    pub augment: bool,
    /// Shuffle the order batches are visited in each epoch
    pub shuffle_batches: bool,
}

impl BatchRequest {
    pub fn new(mode: SamplingMode) -> Self {
        Self {
            mode,
            augment: false,
            shuffle_batches: true,
        }
    }

    pub fn with_augment(mut self, augment: bool) -> Self {
        self.augment = augment;
        self
    }

    pub fn with_shuffle_batches(mut self, shuffle_batches: bool) -> Self {
        self.shuffle_batches = shuffle_batches;
        self
    }
}

/// One batch of transformed images and their label rows
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// batch_size x H x W x 3, row-major
    images: Vec<f32>,
    /// batch_size x label_width, row-major
    labels: Vec<f32>,
    /// Store rows the batch was drawn from, in batch order
    rows: Vec<usize>,
    geometry: ImageGeometry,
    label_width: usize,
    epoch: usize,
}

impl Batch {
    pub(crate) fn new(
        images: Vec<f32>,
        labels: Vec<f32>,
        rows: Vec<usize>,
        geometry: ImageGeometry,
        label_width: usize,
        epoch: usize,
    ) -> Self {
        Self {
            images,
            labels,
            rows,
            geometry,
            label_width,
            epoch,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.rows.len()
    }

    pub fn images(&self) -> &[f32] {
        &self.images
    }

    pub fn labels(&self) -> &[f32] {
        &self.labels
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn geometry(&self) -> ImageGeometry {
        self.geometry
    }

    pub fn label_width(&self) -> usize {
        self.label_width
    }

    /// Zero-based epoch this batch belongs to
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// `[batch_size, H, W, 3]`
    pub fn images_shape(&self) -> [usize; 4] {
        [
            self.batch_size(),
            self.geometry.height,
            self.geometry.width,
            CHANNELS,
        ]
    }

    /// `[batch_size, label_width]`
    pub fn labels_shape(&self) -> [usize; 2] {
        [self.batch_size(), self.label_width]
    }

    /// Label row of the `index`-th example
    pub fn label_row(&self, index: usize) -> &[f32] {
        &self.labels[index * self.label_width..(index + 1) * self.label_width]
    }

    pub fn into_parts(self) -> (Vec<f32>, Vec<f32>) {
        (self.images, self.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names_round_trip() {
        for mode in SamplingMode::ALL {
            assert_eq!(mode.name().parse::<SamplingMode>().unwrap(), mode);
            assert_eq!(mode.strategy().mode(), mode);
        }
        assert!("train".parse::<SamplingMode>().is_err());
    }

    #[test]
    fn test_mode_serde_matches_name() {
        let json = serde_json::to_string(&SamplingMode::TrainLabeledSorted).unwrap();
        assert_eq!(json, "\"train_labeled_sorted\"");
        let mode: SamplingMode = serde_json::from_str("\"val\"").unwrap();
        assert_eq!(mode, SamplingMode::Val);
    }

    #[test]
    fn test_batch_shapes() {
        let geometry = ImageGeometry::new(2, 3);
        let batch = Batch::new(
            vec![0.0; 2 * geometry.pixel_len()],
            vec![0.0, 1.0, 1.0, 0.0],
            vec![4, 9],
            geometry,
            2,
            0,
        );
        assert_eq!(batch.images_shape(), [2, 2, 3, 3]);
        assert_eq!(batch.labels_shape(), [2, 2]);
        assert_eq!(batch.label_row(1), &[1.0, 0.0]);
    }

    #[test]
    fn test_request_builder() {
        let request = BatchRequest::new(SamplingMode::Val)
            .with_augment(true)
            .with_shuffle_batches(false);
        assert!(request.augment);
        assert!(!request.shuffle_batches);
    }
}
