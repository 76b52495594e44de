//! Dataset store adapter
//!
//! A store is a flat namespace of n-dimensional f32 arrays keyed by name,
//! mirroring an HDF5-style container. Rows run along the first axis. For a
//! dataset the handler expects, per split prefix `<split>`:
//!
//! - `<split>_images`: N x (H * W * 3)
//! - `<split>_image_shapes`: N x 3 (present, not used for sampling)
//! - `<split>_labels`: N x C, binary
//!
//! plus one dataset-wide `mean` array of shape H x W x 3.

use std::collections::HashMap;
use std::ops::Range;

use crate::dataset::labels::LabelMatrix;
use crate::utils::error::{Result, SslDataError};

/// Key of the dataset-wide per-pixel mean
pub const MEAN_KEY: &str = "mean";

/// Per-split collections of a dataset store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Images,
    ImageShapes,
    Labels,
}

impl Collection {
    pub const ALL: [Collection; 3] =
        [Collection::Images, Collection::ImageShapes, Collection::Labels];

    fn suffix(&self) -> &'static str {
        match self {
            Collection::Images => "images",
            Collection::ImageShapes => "image_shapes",
            Collection::Labels => "labels",
        }
    }

    /// Store key of this collection for a split prefix, e.g. `val_labels`
    pub fn key(&self, split_name: &str) -> String {
        format!("{}_{}", split_name, self.suffix())
    }
}

/// Read-only random access to a dataset container.
///
/// Both read methods return rows flattened and concatenated in the order
/// requested. Implementations report failures as [`SslDataError::StoreAccess`].
pub trait DatasetStore {
    /// Full shape of an array, rows first
    fn shape(&self, key: &str) -> Result<Vec<usize>>;

    /// Contiguous row range
    fn read_range(&self, key: &str, rows: Range<usize>) -> Result<Vec<f32>>;

    /// Arbitrary rows, in the given order (duplicates allowed)
    fn read_rows(&self, key: &str, indices: &[usize]) -> Result<Vec<f32>>;

    /// Number of rows of an array
    fn num_rows(&self, key: &str) -> Result<usize> {
        Ok(self.shape(key)?.first().copied().unwrap_or(0))
    }

    /// Number of values per row
    fn row_width(&self, key: &str) -> Result<usize> {
        Ok(self.shape(key)?.iter().skip(1).product())
    }

    /// Read a whole array
    fn read_all(&self, key: &str) -> Result<Vec<f32>> {
        let rows = self.num_rows(key)?;
        self.read_range(key, 0..rows)
    }

    /// Read a whole 2-d array as a label matrix
    fn read_label_matrix(&self, key: &str) -> Result<LabelMatrix> {
        let rows = self.num_rows(key)?;
        let cols = self.row_width(key)?;
        LabelMatrix::from_flat(rows, cols, self.read_all(key)?)
    }
}

impl<S: DatasetStore + ?Sized> DatasetStore for &S {
    fn shape(&self, key: &str) -> Result<Vec<usize>> {
        (**self).shape(key)
    }

    fn read_range(&self, key: &str, rows: Range<usize>) -> Result<Vec<f32>> {
        (**self).read_range(key, rows)
    }

    fn read_rows(&self, key: &str, indices: &[usize]) -> Result<Vec<f32>> {
        (**self).read_rows(key, indices)
    }
}

#[derive(Debug, Clone)]
struct StoredArray {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl StoredArray {
    fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    fn width(&self) -> usize {
        self.shape.iter().skip(1).product()
    }
}

/// Dataset store held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    arrays: HashMap<String, StoredArray>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) an array. `data.len()` must equal the product of `shape`.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        shape: Vec<usize>,
        data: Vec<f32>,
    ) -> Result<()> {
        let key = key.into();
        let expected: usize = shape.iter().product();
        if shape.is_empty() || expected != data.len() {
            return Err(SslDataError::store(
                key,
                format!("shape {:?} does not match {} values", shape, data.len()),
            ));
        }
        self.arrays.insert(key, StoredArray { shape, data });
        Ok(())
    }

    /// Builder-style [`MemoryStore::insert`]
    pub fn with(
        mut self,
        key: impl Into<String>,
        shape: Vec<usize>,
        data: Vec<f32>,
    ) -> Result<Self> {
        self.insert(key, shape, data)?;
        Ok(self)
    }

    /// Insert a label matrix as a 2-d array
    pub fn insert_labels(&mut self, key: impl Into<String>, labels: &LabelMatrix) -> Result<()> {
        self.insert(
            key,
            vec![labels.num_examples(), labels.num_classes()],
            labels.as_slice().to_vec(),
        )
    }

    /// Names of all stored arrays, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.arrays.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    fn array(&self, key: &str) -> Result<&StoredArray> {
        self.arrays
            .get(key)
            .ok_or_else(|| SslDataError::store(key, "no such collection"))
    }
}

impl DatasetStore for MemoryStore {
    fn shape(&self, key: &str) -> Result<Vec<usize>> {
        Ok(self.array(key)?.shape.clone())
    }

    fn read_range(&self, key: &str, rows: Range<usize>) -> Result<Vec<f32>> {
        let array = self.array(key)?;
        if rows.start > rows.end || rows.end > array.rows() {
            return Err(SslDataError::store(
                key,
                format!("row range {:?} out of bounds for {} rows", rows, array.rows()),
            ));
        }
        let width = array.width();
        Ok(array.data[rows.start * width..rows.end * width].to_vec())
    }

    fn read_rows(&self, key: &str, indices: &[usize]) -> Result<Vec<f32>> {
        let array = self.array(key)?;
        let width = array.width();
        let mut out = Vec::with_capacity(indices.len() * width);
        for &row in indices {
            if row >= array.rows() {
                return Err(SslDataError::store(
                    key,
                    format!("row {} out of bounds for {} rows", row, array.rows()),
                ));
            }
            out.extend_from_slice(&array.data[row * width..(row + 1) * width]);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> MemoryStore {
        MemoryStore::new()
            .with("train_labels", vec![4, 2], vec![1., 0., 0., 1., 1., 1., 0., 0.])
            .unwrap()
    }

    #[test]
    fn test_collection_keys() {
        assert_eq!(Collection::Images.key("train"), "train_images");
        assert_eq!(Collection::ImageShapes.key("test"), "test_image_shapes");
        assert_eq!(Collection::Labels.key("val"), "val_labels");
    }

    #[test]
    fn test_shape_queries() {
        let store = sample_store();
        assert_eq!(store.num_rows("train_labels").unwrap(), 4);
        assert_eq!(store.row_width("train_labels").unwrap(), 2);
    }

    #[test]
    fn test_read_range() {
        let store = sample_store();
        assert_eq!(store.read_range("train_labels", 1..3).unwrap(), vec![0., 1., 1., 1.]);
    }

    #[test]
    fn test_read_rows_preserves_order() {
        let store = sample_store();
        let rows = store.read_rows("train_labels", &[3, 0, 0]).unwrap();
        assert_eq!(rows, vec![0., 0., 1., 0., 1., 0.]);
    }

    #[test]
    fn test_out_of_bounds_is_store_error() {
        let store = sample_store();
        assert!(matches!(
            store.read_rows("train_labels", &[4]),
            Err(SslDataError::StoreAccess { .. })
        ));
        assert!(matches!(
            store.read_range("train_labels", 2..5),
            Err(SslDataError::StoreAccess { .. })
        ));
        assert!(store.shape("missing").is_err());
    }

    #[test]
    fn test_insert_rejects_mismatched_shape() {
        let mut store = MemoryStore::new();
        assert!(store.insert("mean", vec![2, 2, 3], vec![0.0; 11]).is_err());
    }
}
