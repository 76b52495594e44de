//! Directory-backed dataset store
//!
//! Layout on disk:
//!
//! ```text
//! <root>/<dataset>/manifest.json   { "arrays": { "<key>": { "shape": [..], "file": "<key>.bin" } } }
//! <root>/<dataset>/<key>.bin       little-endian f32, row-major
//! ```
//!
//! Files are opened once when the store is opened and only ever read.
//! List reads coalesce runs of consecutive rows into single reads, which is
//! why sorted index lists are cheaper to fetch.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::store::DatasetStore;
use crate::dataset::DatasetId;
use crate::utils::error::{Result, SslDataError};

const MANIFEST_FILE: &str = "manifest.json";
const VALUE_BYTES: usize = std::mem::size_of::<f32>();

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArrayEntry {
    shape: Vec<usize>,
    file: String,
}

impl ArrayEntry {
    fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    fn width(&self) -> usize {
        self.shape.iter().skip(1).product()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    arrays: BTreeMap<String, ArrayEntry>,
}

struct OpenArray {
    entry: ArrayEntry,
    file: Mutex<File>,
}

/// Read-only store over a dataset directory
pub struct DirectoryStore {
    dir: PathBuf,
    arrays: HashMap<String, OpenArray>,
}

impl std::fmt::Debug for DirectoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryStore")
            .field("dir", &self.dir)
            .field("arrays", &self.arrays.len())
            .finish()
    }
}

impl DirectoryStore {
    /// Directory holding a dataset below `root`
    pub fn dataset_dir(root: &Path, dataset: DatasetId) -> PathBuf {
        root.join(dataset.name())
    }

    /// Open `<root>/<dataset>` and every array listed in its manifest
    pub fn open(root: &Path, dataset: DatasetId) -> Result<Self> {
        let dir = Self::dataset_dir(root, dataset);
        let manifest_path = dir.join(MANIFEST_FILE);
        let json = std::fs::read_to_string(&manifest_path).map_err(|e| {
            SslDataError::store(
                MANIFEST_FILE,
                format!("cannot read {}: {}", manifest_path.display(), e),
            )
        })?;
        let manifest: Manifest = serde_json::from_str(&json)
            .map_err(|e| SslDataError::store(MANIFEST_FILE, e.to_string()))?;

        let mut arrays = HashMap::with_capacity(manifest.arrays.len());
        for (key, entry) in manifest.arrays {
            let path = dir.join(&entry.file);
            let file = File::open(&path)
                .map_err(|e| SslDataError::store(&key, format!("{}: {}", path.display(), e)))?;
            let expected = (entry.rows() * entry.width() * VALUE_BYTES) as u64;
            let actual = file
                .metadata()
                .map_err(|e| SslDataError::store(&key, e.to_string()))?
                .len();
            if actual != expected {
                return Err(SslDataError::store(
                    &key,
                    format!(
                        "file holds {} bytes, shape {:?} needs {}",
                        actual, entry.shape, expected
                    ),
                ));
            }
            debug!("Opened array {} with shape {:?}", key, entry.shape);
            arrays.insert(
                key,
                OpenArray {
                    entry,
                    file: Mutex::new(file),
                },
            );
        }

        info!("Opened dataset store at {} ({} arrays)", dir.display(), arrays.len());
        Ok(Self { dir, arrays })
    }

    /// Write `keys` of `source` as a new dataset directory and open it
    pub fn export<S: DatasetStore + ?Sized>(
        source: &S,
        keys: &[&str],
        root: &Path,
        dataset: DatasetId,
    ) -> Result<Self> {
        let dir = Self::dataset_dir(root, dataset);
        std::fs::create_dir_all(&dir)?;

        let mut manifest = Manifest::default();
        for &key in keys {
            let shape = source.shape(key)?;
            let values = source.read_all(key)?;
            let file_name = format!("{}.bin", key);

            let mut bytes = Vec::with_capacity(values.len() * VALUE_BYTES);
            for value in &values {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            let mut file = File::create(dir.join(&file_name))?;
            file.write_all(&bytes)?;

            manifest.arrays.insert(
                key.to_string(),
                ArrayEntry {
                    shape,
                    file: file_name,
                },
            );
        }

        std::fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;
        info!("Wrote {} arrays to {}", keys.len(), dir.display());

        Self::open(root, dataset)
    }

    /// Directory this store reads from
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn array(&self, key: &str) -> Result<&OpenArray> {
        self.arrays
            .get(key)
            .ok_or_else(|| SslDataError::store(key, "no such collection"))
    }

    fn read_span(
        &self,
        key: &str,
        array: &OpenArray,
        rows: Range<usize>,
        out: &mut Vec<f32>,
    ) -> Result<()> {
        let width = array.entry.width();
        let mut buf = vec![0u8; (rows.end - rows.start) * width * VALUE_BYTES];

        let mut file = array
            .file
            .lock()
            .map_err(|_| SslDataError::store(key, "file handle poisoned"))?;
        file.seek(SeekFrom::Start((rows.start * width * VALUE_BYTES) as u64))
            .map_err(|e| SslDataError::store(key, e.to_string()))?;
        file.read_exact(&mut buf)
            .map_err(|e| SslDataError::store(key, e.to_string()))?;

        out.extend(
            buf.chunks_exact(VALUE_BYTES)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
        Ok(())
    }
}

impl DatasetStore for DirectoryStore {
    fn shape(&self, key: &str) -> Result<Vec<usize>> {
        Ok(self.array(key)?.entry.shape.clone())
    }

    fn read_range(&self, key: &str, rows: Range<usize>) -> Result<Vec<f32>> {
        let array = self.array(key)?;
        if rows.start > rows.end || rows.end > array.entry.rows() {
            return Err(SslDataError::store(
                key,
                format!("row range {:?} out of bounds for {} rows", rows, array.entry.rows()),
            ));
        }
        let mut out = Vec::with_capacity((rows.end - rows.start) * array.entry.width());
        self.read_span(key, array, rows, &mut out)?;
        Ok(out)
    }

    fn read_rows(&self, key: &str, indices: &[usize]) -> Result<Vec<f32>> {
        let array = self.array(key)?;
        let total = array.entry.rows();
        if let Some(&bad) = indices.iter().find(|&&row| row >= total) {
            return Err(SslDataError::store(
                key,
                format!("row {} out of bounds for {} rows", bad, total),
            ));
        }

        let mut out = Vec::with_capacity(indices.len() * array.entry.width());
        let mut start = 0;
        while start < indices.len() {
            let mut end = start + 1;
            while end < indices.len() && indices[end] == indices[end - 1] + 1 {
                end += 1;
            }
            self.read_span(key, array, indices[start]..indices[end - 1] + 1, &mut out)?;
            start = end;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::store::MemoryStore;

    fn source() -> MemoryStore {
        MemoryStore::new()
            .with("train_labels", vec![5, 2], (0..10).map(|v| v as f32).collect())
            .unwrap()
            .with("mean", vec![1, 2, 3], vec![0.5; 6])
            .unwrap()
    }

    #[test]
    fn test_export_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let keys = ["train_labels", "mean"];
        let store =
            DirectoryStore::export(&source(), &keys, dir.path(), DatasetId::MsCoco).unwrap();

        assert_eq!(store.shape("mean").unwrap(), vec![1, 2, 3]);
        assert_eq!(store.read_all("mean").unwrap(), vec![0.5; 6]);
        assert_eq!(store.read_range("train_labels", 3..5).unwrap(), vec![6., 7., 8., 9.]);
    }

    #[test]
    fn test_read_rows_order_and_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            DirectoryStore::export(&source(), &["train_labels"], dir.path(), DatasetId::NusWide)
                .unwrap();

        let rows = store.read_rows("train_labels", &[1, 2, 3, 0, 4, 4]).unwrap();
        assert_eq!(rows, vec![2., 3., 4., 5., 6., 7., 0., 1., 8., 9., 8., 9.]);
    }

    #[test]
    fn test_reopen_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        DirectoryStore::export(&source(), &["train_labels"], dir.path(), DatasetId::MsCoco)
            .unwrap();

        let reopened = DirectoryStore::open(dir.path(), DatasetId::MsCoco).unwrap();
        assert_eq!(reopened.num_rows("train_labels").unwrap(), 5);
        assert!(reopened.dir().ends_with("ms_coco"));
    }

    #[test]
    fn test_missing_dataset_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DirectoryStore::open(dir.path(), DatasetId::MsCoco),
            Err(SslDataError::StoreAccess { .. })
        ));
    }

    #[test]
    fn test_out_of_bounds_row() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            DirectoryStore::export(&source(), &["train_labels"], dir.path(), DatasetId::MsCoco)
                .unwrap();
        assert!(store.read_rows("train_labels", &[0, 5]).is_err());
        assert!(store.read_range("train_labels", 4..6).is_err());
    }
}
