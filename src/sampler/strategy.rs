//! One sampling strategy per mode
//!
//! Every stream runs the same pipeline: plan an epoch of positions, resolve
//! positions to store rows (applying the mode's sort policy), fetch images
//! and labels, transform, stack. Strategies supply the mode-specific steps.

use rand::seq::SliceRandom;
use rand::RngCore;

use crate::dataset::labels::LabelMatrix;
use crate::dataset::partition::LabelPartition;
use crate::dataset::store::{Collection, DatasetStore};
use crate::dataset::{DatasetId, Split};
use crate::sampler::indices::{epoch_windows, wrapped_slots};
use crate::sampler::mixed_labels::{MixedLabelChannel, MixedLabelSnapshot};
use crate::sampler::SamplingMode;
use crate::utils::error::{Result, SslDataError};

/// Read-only state shared by all strategies of a handler
#[derive(Clone, Copy)]
pub struct SamplingContext<'a> {
    pub store: &'a dyn DatasetStore,
    pub dataset: DatasetId,
    pub train_labels: &'a LabelMatrix,
    pub partition: &'a LabelPartition,
    pub mixed: &'a MixedLabelChannel,
    pub num_val: usize,
}

impl SamplingContext<'_> {
    /// Store key of the images of a split
    pub fn images_key(&self, split: Split) -> String {
        Collection::Images.key(self.dataset.split_name(split))
    }
}

/// Mode-specific steps of the batch pipeline
pub trait SamplingStrategy: Send {
    fn mode(&self) -> SamplingMode;

    /// Size of the index space the mode samples from
    fn index_space(&self, ctx: &SamplingContext<'_>) -> usize;

    /// Split the images are read from
    fn split(&self) -> Split {
        Split::Train
    }

    /// Values per label row
    fn label_width(&self, ctx: &SamplingContext<'_>) -> usize {
        ctx.train_labels.num_classes()
    }

    /// Positions of every batch of a new epoch, in visiting order
    fn plan_epoch(
        &mut self,
        ctx: &SamplingContext<'_>,
        batch_size: usize,
        shuffle_batches: bool,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Vec<usize>>> {
        let windows = epoch_windows(self.index_space(ctx), batch_size, shuffle_batches, rng)?;
        Ok(windows.into_iter().map(|window| window.collect()).collect())
    }

    /// Store rows for a batch of positions
    fn resolve(&self, ctx: &SamplingContext<'_>, positions: &[usize]) -> Vec<usize>;

    /// Label rows aligned with `rows`
    fn fetch_labels(&self, ctx: &SamplingContext<'_>, rows: &[usize]) -> Result<Vec<f32>> {
        Ok(ctx.train_labels.gather(rows))
    }
}

/// Contiguous slices of the training split
#[derive(Debug, Default)]
pub struct TrainAll;

impl SamplingStrategy for TrainAll {
    fn mode(&self) -> SamplingMode {
        SamplingMode::TrainAll
    }

    fn index_space(&self, ctx: &SamplingContext<'_>) -> usize {
        ctx.train_labels.num_examples()
    }

    fn resolve(&self, _ctx: &SamplingContext<'_>, positions: &[usize]) -> Vec<usize> {
        positions.to_vec()
    }
}

/// Labeled examples in construction order, rows sorted per batch
#[derive(Debug, Default)]
pub struct TrainLabeled;

impl SamplingStrategy for TrainLabeled {
    fn mode(&self) -> SamplingMode {
        SamplingMode::TrainLabeled
    }

    fn index_space(&self, ctx: &SamplingContext<'_>) -> usize {
        ctx.partition.labeled().len()
    }

    fn resolve(&self, ctx: &SamplingContext<'_>, positions: &[usize]) -> Vec<usize> {
        let labeled = ctx.partition.labeled();
        let mut rows: Vec<usize> = positions.iter().map(|&p| labeled[p]).collect();
        rows.sort_unstable();
        rows
    }
}

/// Labeled examples in ascending order
#[derive(Debug, Default)]
pub struct TrainLabeledSorted;

impl SamplingStrategy for TrainLabeledSorted {
    fn mode(&self) -> SamplingMode {
        SamplingMode::TrainLabeledSorted
    }

    fn index_space(&self, ctx: &SamplingContext<'_>) -> usize {
        ctx.partition.labeled_sorted().len()
    }

    fn resolve(&self, ctx: &SamplingContext<'_>, positions: &[usize]) -> Vec<usize> {
        let sorted = ctx.partition.labeled_sorted();
        positions.iter().map(|&p| sorted[p]).collect()
    }
}

#[derive(Debug, Default)]
pub struct TrainUnlabeled;

impl SamplingStrategy for TrainUnlabeled {
    fn mode(&self) -> SamplingMode {
        SamplingMode::TrainUnlabeled
    }

    fn index_space(&self, ctx: &SamplingContext<'_>) -> usize {
        ctx.partition.unlabeled().len()
    }

    fn resolve(&self, ctx: &SamplingContext<'_>, positions: &[usize]) -> Vec<usize> {
        let unlabeled = ctx.partition.unlabeled();
        positions.iter().map(|&p| unlabeled[p]).collect()
    }
}

/// Contiguous slices of the evaluation split, labels read from the store
#[derive(Debug, Default)]
pub struct Validation;

impl SamplingStrategy for Validation {
    fn mode(&self) -> SamplingMode {
        SamplingMode::Val
    }

    fn index_space(&self, ctx: &SamplingContext<'_>) -> usize {
        ctx.num_val
    }

    fn split(&self) -> Split {
        Split::Validation
    }

    fn resolve(&self, _ctx: &SamplingContext<'_>, positions: &[usize]) -> Vec<usize> {
        positions.to_vec()
    }

    fn fetch_labels(&self, ctx: &SamplingContext<'_>, rows: &[usize]) -> Result<Vec<f32>> {
        let key = Collection::Labels.key(ctx.dataset.split_name(Split::Validation));
        ctx.store.read_rows(&key, rows)
    }
}

/// Labeled then unlabeled examples, example-level shuffle, mixed labels
#[derive(Debug, Default)]
pub struct TrainMixed {
    snapshot: Option<MixedLabelSnapshot>,
}

impl SamplingStrategy for TrainMixed {
    fn mode(&self) -> SamplingMode {
        SamplingMode::TrainMixed
    }

    fn index_space(&self, ctx: &SamplingContext<'_>) -> usize {
        ctx.partition.labeled().len() + ctx.partition.unlabeled().len()
    }

    fn label_width(&self, ctx: &SamplingContext<'_>) -> usize {
        ctx.mixed.label_width()
    }

    fn plan_epoch(
        &mut self,
        ctx: &SamplingContext<'_>,
        batch_size: usize,
        _shuffle_batches: bool,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Vec<usize>>> {
        let mut slots = wrapped_slots(self.index_space(ctx), batch_size)?;
        slots.shuffle(rng);
        self.snapshot = Some(ctx.mixed.snapshot()?);
        Ok(slots.chunks(batch_size).map(<[usize]>::to_vec).collect())
    }

    fn resolve(&self, ctx: &SamplingContext<'_>, positions: &[usize]) -> Vec<usize> {
        let labeled = ctx.partition.labeled();
        let unlabeled = ctx.partition.unlabeled();
        positions
            .iter()
            .map(|&slot| {
                if slot < labeled.len() {
                    labeled[slot]
                } else {
                    unlabeled[slot - labeled.len()]
                }
            })
            .collect()
    }

    fn fetch_labels(&self, _ctx: &SamplingContext<'_>, rows: &[usize]) -> Result<Vec<f32>> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or_else(|| {
                SslDataError::MixedLabels("epoch started without a snapshot".to_string())
            })?;
        Ok(snapshot.labels().gather(rows))
    }
}
