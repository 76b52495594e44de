//! Dataset module for multi-label image data handling
//!
//! This module provides functionality for:
//! - Addressing the on-disk (or in-memory) dataset store by split and collection
//! - Dense binary label matrices
//! - Label-balanced labeled/unlabeled partitioning
//! - Class-frequency-driven label corruption
//! - The augmentation gateway applied to every materialized image
//!
//! ## Supported datasets
//!
//! | identity   | classes | splits          |
//! |------------|---------|-----------------|
//! | `nus_wide` | 81      | `train`, `test` |
//! | `ms_coco`  | 80      | `train`, `val`  |

pub mod augmentation;
pub mod corruption;
pub mod directory_store;
pub mod labels;
pub mod partition;
pub mod store;
pub mod synthetic;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::SslDataError;

pub use augmentation::{AugmentationConfig, ImageTransform, Preprocessor};
pub use corruption::{corrupt_labels, CorruptionReport};
pub use directory_store::DirectoryStore;
pub use labels::LabelMatrix;
pub use partition::{LabelPartition, PartitionConfig, PartitionStats};
pub use store::{Collection, DatasetStore, MemoryStore, MEAN_KEY};
pub use synthetic::{PixelFill, SyntheticSpec};

/// Number of colour channels of every stored image
pub const CHANNELS: usize = 3;

/// Dataset identities understood by the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetId {
    NusWide,
    MsCoco,
}

impl DatasetId {
    /// All supported identities
    pub const ALL: [DatasetId; 2] = [DatasetId::NusWide, DatasetId::MsCoco];

    /// Number of classes in the label vectors of this dataset
    pub fn num_classes(&self) -> usize {
        match self {
            DatasetId::NusWide => 81,
            DatasetId::MsCoco => 80,
        }
    }

    /// Name used for the store file / directory
    pub fn name(&self) -> &'static str {
        match self {
            DatasetId::NusWide => "nus_wide",
            DatasetId::MsCoco => "ms_coco",
        }
    }

    /// Store prefix of a split. The evaluation split is `test` for NUS-WIDE and `val` for COCO.
    pub fn split_name(&self, split: Split) -> &'static str {
        match (self, split) {
            (_, Split::Train) => "train",
            (DatasetId::NusWide, Split::Validation) => "test",
            (DatasetId::MsCoco, Split::Validation) => "val",
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetId {
    type Err = SslDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatasetId::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| {
                SslDataError::config(format!(
                    "unsupported dataset '{}' (expected one of: nus_wide, ms_coco)",
                    s
                ))
            })
    }
}

/// The two splits every dataset carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Validation,
}

/// Spatial layout of the images of a dataset (HWC, 3 channels)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageGeometry {
    pub height: usize,
    pub width: usize,
}

impl ImageGeometry {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Length of one flattened image
    pub fn pixel_len(&self) -> usize {
        self.height * self.width * CHANNELS
    }

    /// Square geometry
    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_counts() {
        assert_eq!(DatasetId::NusWide.num_classes(), 81);
        assert_eq!(DatasetId::MsCoco.num_classes(), 80);
    }

    #[test]
    fn test_split_names() {
        assert_eq!(DatasetId::NusWide.split_name(Split::Validation), "test");
        assert_eq!(DatasetId::MsCoco.split_name(Split::Validation), "val");
        assert_eq!(DatasetId::MsCoco.split_name(Split::Train), "train");
    }

    #[test]
    fn test_dataset_from_str() {
        assert_eq!("ms_coco".parse::<DatasetId>().unwrap(), DatasetId::MsCoco);
        assert_eq!("nus_wide".parse::<DatasetId>().unwrap(), DatasetId::NusWide);
        assert!(matches!(
            "imagenet".parse::<DatasetId>(),
            Err(SslDataError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_dataset_serde_names() {
        let json = serde_json::to_string(&DatasetId::NusWide).unwrap();
        assert_eq!(json, "\"nus_wide\"");
    }

    #[test]
    fn test_geometry_pixel_len() {
        assert_eq!(ImageGeometry::square(224).pixel_len(), 224 * 224 * 3);
    }
}
