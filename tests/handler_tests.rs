//! End-to-end tests of the data handler over in-memory and on-disk stores

use std::collections::HashMap;
use std::ops::Range;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use multilabel_ssl::dataset::synthetic::{build_store, store_keys, PixelFill, SyntheticSpec};
use multilabel_ssl::{
    BatchRequest, DataHandler, DatasetId, DatasetStore, DirectoryStore, HandlerConfig,
    ImageGeometry, LabelMatrix, MemoryStore, SamplingMode, SslDataError,
};

const GEOMETRY: ImageGeometry = ImageGeometry { height: 4, width: 4 };

/// Store whose every pixel of example `i` equals `i` (mean is zero)
fn indexed_store(dataset: DatasetId, train: usize, val: usize) -> MemoryStore {
    let spec = SyntheticSpec::new(dataset, train, val)
        .with_geometry(GEOMETRY)
        .with_pixel_fill(PixelFill::ExampleIndex);
    build_store(&spec, &mut ChaCha8Rng::seed_from_u64(99)).unwrap()
}

fn plain(mode: SamplingMode) -> BatchRequest {
    BatchRequest::new(mode).with_shuffle_batches(false)
}

/// Row encoded in the (plain, zero-mean) image of batch position `i`
fn image_row(batch: &multilabel_ssl::Batch, i: usize) -> usize {
    let len = GEOMETRY.pixel_len();
    batch.images()[i * len] as usize
}

#[test]
fn coco_ten_percent_labeled_twenty_percent_corrupted() {
    let store = indexed_store(DatasetId::MsCoco, 2000, 200);
    let original = store.read_label_matrix("train_labels").unwrap();
    let val_labels = store.read_label_matrix("val_labels").unwrap();

    let config = HandlerConfig::new(DatasetId::MsCoco)
        .with_labeled_ratio(10.0)
        .with_corruption_ratio(20.0)
        .with_batch_size(16);
    let handler = DataHandler::from_seed(config, store).unwrap();

    let partition = handler.partition();
    let realized = partition.realized_ratio();
    assert!((10.0..=10.5).contains(&realized), "realized {}", realized);

    let corruption = handler.corruption();
    let expected = (partition.labeled().len() as f64 * 0.2).floor() as usize;
    assert_eq!(corruption.count(), expected);
    assert!(expected > 0);

    let labeled: std::collections::HashSet<usize> = partition.labeled().iter().copied().collect();
    for row in 0..handler.num_train() {
        let corrupted = corruption.corrupted.contains(&row);
        if !corrupted {
            assert_eq!(handler.train_labels().row(row), original.row(row));
        } else {
            assert!(labeled.contains(&row));
            assert!(handler.train_labels().row(row).iter().any(|&v| v == 1.0));
        }
    }

    // validation batches come from the untouched validation labels
    let mut stream = handler.stream_seeded(BatchRequest::new(SamplingMode::Val), 5).unwrap();
    for _ in 0..15 {
        let batch = stream.next_batch().unwrap();
        assert_eq!(batch.labels_shape(), [16, 80]);
        for (i, &row) in batch.rows().iter().enumerate() {
            assert!(row < 200);
            assert_eq!(image_row(&batch, i), row);
            assert_eq!(batch.label_row(i), val_labels.row(row));
        }
    }
}

#[test]
fn every_mode_yields_exact_batch_shapes() {
    let store = indexed_store(DatasetId::NusWide, 300, 70);
    let config = HandlerConfig::new(DatasetId::NusWide)
        .with_labeled_ratio(30.0)
        .with_batch_size(8);
    let handler = DataHandler::from_seed(config, store).unwrap();
    handler
        .publish_mixed_labels(LabelMatrix::zeros(300, 82))
        .unwrap();

    for mode in SamplingMode::ALL {
        for augment in [false, true] {
            let request = BatchRequest::new(mode).with_augment(augment);
            let mut stream = handler.stream_seeded(request, 1).unwrap();
            for _ in 0..(stream.batches_per_epoch() + 2) {
                let batch = stream.next_batch().unwrap();
                assert_eq!(batch.images_shape(), [8, 4, 4, 3], "{}", mode);
                assert_eq!(batch.images().len(), 8 * GEOMETRY.pixel_len());
                let width = if mode == SamplingMode::TrainMixed { 82 } else { 81 };
                assert_eq!(batch.labels_shape(), [8, width], "{}", mode);
            }
        }
    }
}

#[test]
fn labeled_final_batch_repeats_last_window() {
    let store = indexed_store(DatasetId::MsCoco, 10, 4);
    let config = HandlerConfig::new(DatasetId::MsCoco).with_batch_size(4);
    let handler = DataHandler::from_seed(config, store).unwrap();
    assert_eq!(handler.partition().labeled_sorted(), (0..10).collect::<Vec<_>>());

    let mut stream = handler.stream_seeded(plain(SamplingMode::TrainLabeled), 0).unwrap();
    let rows: Vec<Vec<usize>> = (0..3)
        .map(|_| stream.next_batch().unwrap().rows().to_vec())
        .collect();

    assert_eq!(rows[0], vec![0, 1, 2, 3]);
    assert_eq!(rows[1], vec![4, 5, 6, 7]);
    assert_eq!(rows[2], vec![6, 7, 8, 9]);

    // next epoch starts over
    let next = stream.next_batch().unwrap();
    assert_eq!(next.rows(), &[0, 1, 2, 3]);
    assert_eq!(next.epoch(), 1);
}

#[test]
fn labeled_mode_sorts_rows_within_batch() {
    let store = indexed_store(DatasetId::MsCoco, 400, 10);
    let config = HandlerConfig::new(DatasetId::MsCoco)
        .with_labeled_ratio(25.0)
        .with_batch_size(10);
    let handler = DataHandler::from_seed(config, store).unwrap();

    let mut stream = handler
        .stream_seeded(BatchRequest::new(SamplingMode::TrainLabeled), 3)
        .unwrap();
    for _ in 0..stream.batches_per_epoch() {
        let batch = stream.next_batch().unwrap();
        assert!(batch.rows().windows(2).all(|w| w[0] <= w[1]));
        for (i, &row) in batch.rows().iter().enumerate() {
            assert_eq!(image_row(&batch, i), row);
            assert_eq!(batch.label_row(i), handler.train_labels().row(row));
        }
    }
}

#[test]
fn mixed_mode_wraps_and_reads_mixed_labels() {
    let store = indexed_store(DatasetId::MsCoco, 9, 4);
    let config = HandlerConfig::new(DatasetId::MsCoco).with_batch_size(4);
    let handler = DataHandler::from_seed(config, store).unwrap();

    let mut stream = handler.stream_seeded(plain(SamplingMode::TrainMixed), 4).unwrap();
    assert!(matches!(stream.next_batch(), Err(SslDataError::MixedLabels(_))));

    // row r of the mixed labels is filled with r
    let mixed = LabelMatrix::from_flat(9, 81, (0..9).flat_map(|r| vec![r as f32; 81]).collect())
        .unwrap();
    handler.publish_mixed_labels(mixed).unwrap();

    let mut stream = handler.stream_seeded(plain(SamplingMode::TrainMixed), 4).unwrap();
    assert_eq!(stream.batches_per_epoch(), 3);

    let mut seen: HashMap<usize, usize> = HashMap::new();
    for _ in 0..3 {
        let batch = stream.next_batch().unwrap();
        assert_eq!(batch.labels_shape(), [4, 81]);
        for (i, &row) in batch.rows().iter().enumerate() {
            assert_eq!(image_row(&batch, i), row);
            assert!(batch.label_row(i).iter().all(|&v| v == row as f32));
            *seen.entry(row).or_default() += 1;
        }
    }

    // overflow slots reuse the first three examples
    for row in 0..9 {
        let expected = if row < 3 { 2 } else { 1 };
        assert_eq!(seen[&row], expected, "row {}", row);
    }
}

#[test]
fn mixed_publish_applies_from_next_epoch() {
    let store = indexed_store(DatasetId::MsCoco, 8, 4);
    let config = HandlerConfig::new(DatasetId::MsCoco).with_batch_size(4);
    let handler = DataHandler::from_seed(config, store).unwrap();
    handler.publish_mixed_labels(LabelMatrix::zeros(8, 81)).unwrap();

    let mut stream = handler.stream_seeded(plain(SamplingMode::TrainMixed), 0).unwrap();
    let first = stream.next_batch().unwrap();
    assert!(first.labels().iter().all(|&v| v == 0.0));

    handler
        .mixed_labels()
        .publish(LabelMatrix::from_flat(8, 81, vec![1.0; 8 * 81]).unwrap())
        .unwrap();

    // rest of the epoch keeps its snapshot
    let second = stream.next_batch().unwrap();
    assert!(second.labels().iter().all(|&v| v == 0.0));

    let next_epoch = stream.next_batch().unwrap();
    assert_eq!(next_epoch.epoch(), 1);
    assert!(next_epoch.labels().iter().all(|&v| v == 1.0));
}

#[test]
fn batch_size_above_index_space_is_rejected() {
    let store = indexed_store(DatasetId::MsCoco, 40, 6);
    let config = HandlerConfig::new(DatasetId::MsCoco).with_batch_size(8);
    let handler = DataHandler::from_seed(config, store).unwrap();

    assert!(matches!(
        handler.stream_seeded(BatchRequest::new(SamplingMode::Val), 0),
        Err(SslDataError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        handler.stream_seeded(BatchRequest::new(SamplingMode::TrainUnlabeled), 0),
        Err(SslDataError::InvalidConfiguration(_))
    ));
}

#[test]
fn same_seed_same_partition_and_batches() {
    let build = || {
        let config = HandlerConfig::new(DatasetId::NusWide)
            .with_labeled_ratio(20.0)
            .with_corruption_ratio(10.0)
            .with_batch_size(12)
            .with_seed(7);
        DataHandler::from_seed(config, indexed_store(DatasetId::NusWide, 500, 50)).unwrap()
    };
    let a = build();
    let b = build();
    assert_eq!(a.partition(), b.partition());
    assert_eq!(a.train_labels(), b.train_labels());

    let request = BatchRequest::new(SamplingMode::TrainLabeled).with_augment(true);
    let pull = |handler: &DataHandler<MemoryStore>| -> Vec<_> {
        handler
            .stream_seeded(request, 11)
            .unwrap()
            .take(6)
            .collect::<Result<_, _>>()
            .unwrap()
    };
    let batches_a = pull(&a);
    let batches_b = pull(&b);
    assert_eq!(batches_a, batches_b);
}

#[test]
fn unshuffled_epochs_repeat() {
    let store = indexed_store(DatasetId::MsCoco, 30, 6);
    let config = HandlerConfig::new(DatasetId::MsCoco).with_batch_size(7);
    let handler = DataHandler::from_seed(config, store).unwrap();

    let mut stream = handler.stream_seeded(plain(SamplingMode::TrainAll), 0).unwrap();
    let per_epoch = stream.batches_per_epoch();
    assert_eq!(per_epoch, 5);

    let first: Vec<Vec<usize>> = (0..per_epoch)
        .map(|_| stream.next_batch().unwrap().rows().to_vec())
        .collect();
    let second: Vec<Vec<usize>> = (0..per_epoch)
        .map(|_| stream.next_batch().unwrap().rows().to_vec())
        .collect();
    assert_eq!(first, second);
    assert_eq!(first[4], (23..30).collect::<Vec<_>>());
    assert_eq!(stream.epochs_started(), 2);
}

#[test]
fn directory_store_matches_memory_store() {
    let dir = tempfile::tempdir().unwrap();
    let spec = SyntheticSpec::new(DatasetId::NusWide, 120, 24).with_geometry(GEOMETRY);
    let memory = build_store(&spec, &mut ChaCha8Rng::seed_from_u64(5)).unwrap();
    let keys = store_keys(DatasetId::NusWide);
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    DirectoryStore::export(&memory, &key_refs, dir.path(), DatasetId::NusWide).unwrap();
    let disk = DirectoryStore::open(dir.path(), DatasetId::NusWide).unwrap();

    let config = HandlerConfig::new(DatasetId::NusWide)
        .with_labeled_ratio(50.0)
        .with_batch_size(10);
    let from_memory = DataHandler::from_seed(config.clone(), memory).unwrap();
    let from_disk = DataHandler::from_seed(config, disk).unwrap();
    assert_eq!(from_memory.partition(), from_disk.partition());

    for mode in [SamplingMode::TrainLabeledSorted, SamplingMode::Val] {
        let request = BatchRequest::new(mode).with_augment(true);
        let mut a = from_memory.stream_seeded(request, 2).unwrap();
        let mut b = from_disk.stream_seeded(request, 2).unwrap();
        for _ in 0..4 {
            assert_eq!(a.next_batch().unwrap(), b.next_batch().unwrap());
        }
    }
}

#[test]
fn plain_transform_centers_on_mean() {
    let spec = SyntheticSpec::new(DatasetId::MsCoco, 16, 4).with_geometry(GEOMETRY);
    let store = build_store(&spec, &mut ChaCha8Rng::seed_from_u64(8)).unwrap();
    let mean = store.read_all("mean").unwrap();
    let raw = store.read_rows("train_images", &[0, 1, 2, 3]).unwrap();

    let config = HandlerConfig::new(DatasetId::MsCoco).with_batch_size(4);
    let handler = DataHandler::from_seed(config, store).unwrap();
    let batch = handler
        .stream_seeded(plain(SamplingMode::TrainAll), 0)
        .unwrap()
        .next_batch()
        .unwrap();

    assert_eq!(batch.rows(), &[0, 1, 2, 3]);
    let len = GEOMETRY.pixel_len();
    for (i, (&value, &original)) in batch.images().iter().zip(&raw).enumerate() {
        assert!((value - (original - mean[i % len])).abs() < 1e-4);
    }
}

/// Store that fails list reads of one collection after construction succeeds
struct FailingReads {
    inner: MemoryStore,
    key: &'static str,
}

impl DatasetStore for FailingReads {
    fn shape(&self, key: &str) -> multilabel_ssl::Result<Vec<usize>> {
        self.inner.shape(key)
    }

    fn read_range(&self, key: &str, rows: Range<usize>) -> multilabel_ssl::Result<Vec<f32>> {
        self.inner.read_range(key, rows)
    }

    fn read_rows(&self, key: &str, indices: &[usize]) -> multilabel_ssl::Result<Vec<f32>> {
        if key == self.key {
            return Err(SslDataError::store(key, "device unavailable"));
        }
        self.inner.read_rows(key, indices)
    }
}

#[test]
fn store_failure_during_batch_is_returned_unchanged() {
    let store = FailingReads {
        inner: indexed_store(DatasetId::MsCoco, 40, 10),
        key: "train_images",
    };
    let config = HandlerConfig::new(DatasetId::MsCoco)
        .with_labeled_ratio(50.0)
        .with_batch_size(4);
    let handler = DataHandler::from_seed(config, store).unwrap();

    let mut stream = handler
        .stream_seeded(BatchRequest::new(SamplingMode::TrainLabeled), 3)
        .unwrap();
    match stream.next_batch() {
        Err(SslDataError::StoreAccess { collection, message }) => {
            assert_eq!(collection, "train_images");
            assert_eq!(message, "device unavailable");
        }
        other => panic!("expected the store error, got {:?}", other),
    }

    // other collections still read fine
    let mut val = handler.stream_seeded(plain(SamplingMode::Val), 0).unwrap();
    assert_eq!(val.next_batch().unwrap().batch_size(), 4);
}
