//! Data handler
//!
//! Ties the pieces together: validates the store layout, draws the
//! labeled/unlabeled partition, corrupts labeled rows, and serves batch
//! streams. Everything computed at construction is read-only afterwards;
//! only the mixed label channel can change.

use std::sync::Arc;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::HandlerConfig;
use crate::dataset::augmentation::{ImageTransform, Preprocessor};
use crate::dataset::corruption::{corrupt_labels, CorruptionReport};
use crate::dataset::labels::LabelMatrix;
use crate::dataset::partition::{LabelPartition, PartitionStats};
use crate::dataset::store::{Collection, DatasetStore, MEAN_KEY};
use crate::dataset::{DatasetId, ImageGeometry, Split, CHANNELS};
use crate::sampler::{BatchRequest, BatchStream, MixedLabelChannel, SamplingContext};
use crate::utils::error::{Result, SslDataError};

/// Partitioned, optionally corrupted view of a dataset store
pub struct DataHandler<S> {
    config: HandlerConfig,
    store: S,
    geometry: ImageGeometry,
    num_val: usize,
    train_labels: LabelMatrix,
    partition: LabelPartition,
    partition_stats: PartitionStats,
    corruption: CorruptionReport,
    mixed: MixedLabelChannel,
    plain: Box<dyn ImageTransform>,
    augmenting: Box<dyn ImageTransform>,
}

impl<S: DatasetStore> DataHandler<S> {
    /// Build a handler, drawing partition and corruption from `rng`
    pub fn new<R: Rng + ?Sized>(config: HandlerConfig, store: S, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let dataset = config.dataset;
        let layout = check_layout(&store, dataset)?;

        let mean: Arc<[f32]> = store.read_all(MEAN_KEY)?.into();
        let train_labels =
            store.read_label_matrix(&Collection::Labels.key(dataset.split_name(Split::Train)))?;

        let partition = LabelPartition::compute(
            &train_labels,
            config.labeled_ratio,
            &config.partition_config(),
            rng,
        )?;
        let partition_stats = partition.stats(&train_labels);
        let (train_labels, corruption) =
            corrupt_labels(train_labels, partition.labeled(), config.corruption_ratio, rng)?;

        info!(
            "Data handler ready for {}: {} train / {} {} examples, {}x{} images, {} labeled, {} corrupted",
            dataset,
            layout.num_train,
            layout.num_val,
            dataset.split_name(Split::Validation),
            layout.geometry.height,
            layout.geometry.width,
            partition.labeled().len(),
            corruption.count()
        );

        Ok(Self {
            mixed: MixedLabelChannel::new(layout.num_train, dataset.num_classes() + 1),
            plain: Box::new(Preprocessor::plain().with_mean(mean.clone())),
            augmenting: Box::new(Preprocessor::augmenting().with_mean(mean)),
            config,
            store,
            geometry: layout.geometry,
            num_val: layout.num_val,
            train_labels,
            partition,
            partition_stats,
            corruption,
        })
    }

    /// Build a handler seeded from `config.seed`
    pub fn from_seed(config: HandlerConfig, store: S) -> Result<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self::new(config, store, &mut rng)
    }

    /// Replace the plain and augmenting transforms
    pub fn with_transforms(
        mut self,
        plain: impl ImageTransform + 'static,
        augmenting: impl ImageTransform + 'static,
    ) -> Self {
        self.plain = Box::new(plain);
        self.augmenting = Box::new(augmenting);
        self
    }

    /// Open an infinite batch stream
    ///
    /// Fails with `InvalidConfiguration` when the batch size exceeds the
    /// mode's index space.
    pub fn stream<R: RngCore>(&self, request: BatchRequest, rng: R) -> Result<BatchStream<'_, R>> {
        let transform: &dyn ImageTransform = if request.augment {
            self.augmenting.as_ref()
        } else {
            self.plain.as_ref()
        };
        BatchStream::new(
            self.context(),
            request.mode,
            request.shuffle_batches,
            transform,
            self.geometry,
            self.config.batch_size,
            rng,
        )
    }

    /// [`DataHandler::stream`] with a fresh `ChaCha8Rng`
    pub fn stream_seeded(
        &self,
        request: BatchRequest,
        seed: u64,
    ) -> Result<BatchStream<'_, ChaCha8Rng>> {
        self.stream(request, ChaCha8Rng::seed_from_u64(seed))
    }

    fn context(&self) -> SamplingContext<'_> {
        SamplingContext {
            store: &self.store,
            dataset: self.config.dataset,
            train_labels: &self.train_labels,
            partition: &self.partition,
            mixed: &self.mixed,
            num_val: self.num_val,
        }
    }

    /// Writer side of the mixed labels; clones share the buffer
    pub fn mixed_labels(&self) -> &MixedLabelChannel {
        &self.mixed
    }

    /// Publish new mixed labels (N x (C + 1))
    pub fn publish_mixed_labels(&self, labels: LabelMatrix) -> Result<u64> {
        self.mixed.publish(labels)
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn dataset(&self) -> DatasetId {
        self.config.dataset
    }

    pub fn num_classes(&self) -> usize {
        self.config.dataset.num_classes()
    }

    pub fn geometry(&self) -> ImageGeometry {
        self.geometry
    }

    pub fn num_train(&self) -> usize {
        self.train_labels.num_examples()
    }

    pub fn num_val(&self) -> usize {
        self.num_val
    }

    /// Training labels after corruption
    pub fn train_labels(&self) -> &LabelMatrix {
        &self.train_labels
    }

    pub fn partition(&self) -> &LabelPartition {
        &self.partition
    }

    pub fn corruption(&self) -> &CorruptionReport {
        &self.corruption
    }

    /// Partition statistics, with class coverage measured on the labels before corruption
    pub fn partition_stats(&self) -> &PartitionStats {
        &self.partition_stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

struct StoreLayout {
    geometry: ImageGeometry,
    num_train: usize,
    num_val: usize,
}

/// Check that every collection the handler reads is present and consistent
fn check_layout<S: DatasetStore>(store: &S, dataset: DatasetId) -> Result<StoreLayout> {
    let mean_shape = store.shape(MEAN_KEY)?;
    let geometry = match mean_shape.as_slice() {
        &[height, width, channels] if channels == CHANNELS && height > 0 && width > 0 => {
            ImageGeometry::new(height, width)
        }
        _ => {
            return Err(SslDataError::store(
                MEAN_KEY,
                format!("expected shape [H, W, {}], got {:?}", CHANNELS, mean_shape),
            ))
        }
    };

    let mut counts = [0usize; 2];
    for (count, split) in counts.iter_mut().zip([Split::Train, Split::Validation]) {
        let prefix = dataset.split_name(split);
        let images_key = Collection::Images.key(prefix);
        let shapes_key = Collection::ImageShapes.key(prefix);
        let labels_key = Collection::Labels.key(prefix);

        let rows = store.num_rows(&images_key)?;
        for key in [&shapes_key, &labels_key] {
            let other = store.num_rows(key)?;
            if other != rows {
                return Err(SslDataError::store(
                    key.as_str(),
                    format!("{} rows, but {} has {}", other, images_key, rows),
                ));
            }
        }

        let pixels = store.row_width(&images_key)?;
        if pixels != geometry.pixel_len() {
            return Err(SslDataError::store(
                images_key,
                format!(
                    "rows hold {} values, mean geometry needs {}",
                    pixels,
                    geometry.pixel_len()
                ),
            ));
        }

        let classes = store.row_width(&labels_key)?;
        if classes != dataset.num_classes() {
            return Err(SslDataError::config(format!(
                "{} has {} classes, {} expects {}",
                labels_key,
                classes,
                dataset,
                dataset.num_classes()
            )));
        }
        *count = rows;
    }

    Ok(StoreLayout {
        geometry,
        num_train: counts[0],
        num_val: counts[1],
    })
}
