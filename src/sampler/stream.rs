use std::collections::VecDeque;

use rand::RngCore;
use tracing::debug;

use crate::dataset::augmentation::ImageTransform;
use crate::dataset::ImageGeometry;
use crate::sampler::indices::check_batch_size;
use crate::sampler::strategy::{SamplingContext, SamplingStrategy};
use crate::sampler::{Batch, SamplingMode};
use crate::utils::error::{Result, SslDataError};

/// Infinite stream of batches for one request
///
/// Never yields `None`; stop pulling to cancel. Store failures are yielded as
/// `Some(Err(..))` and are not retried.
pub struct BatchStream<'a, R> {
    ctx: SamplingContext<'a>,
    strategy: Box<dyn SamplingStrategy>,
    transform: &'a dyn ImageTransform,
    geometry: ImageGeometry,
    batch_size: usize,
    shuffle_batches: bool,
    images_key: String,
    label_width: usize,
    pending: VecDeque<Vec<usize>>,
    epochs_started: usize,
    rng: R,
}

impl<'a, R: RngCore> BatchStream<'a, R> {
    pub(crate) fn new(
        ctx: SamplingContext<'a>,
        mode: SamplingMode,
        shuffle_batches: bool,
        transform: &'a dyn ImageTransform,
        geometry: ImageGeometry,
        batch_size: usize,
        rng: R,
    ) -> Result<Self> {
        let strategy = mode.strategy();
        check_batch_size(strategy.index_space(&ctx), batch_size)?;

        let images_key = ctx.images_key(strategy.split());
        let label_width = strategy.label_width(&ctx);
        debug!(
            mode = %mode,
            batch_size,
            index_space = strategy.index_space(&ctx),
            "opened batch stream"
        );

        Ok(Self {
            ctx,
            strategy,
            transform,
            geometry,
            batch_size,
            shuffle_batches,
            images_key,
            label_width,
            pending: VecDeque::new(),
            epochs_started: 0,
            rng,
        })
    }

    pub fn mode(&self) -> SamplingMode {
        self.strategy.mode()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Batches per epoch
    pub fn batches_per_epoch(&self) -> usize {
        super::indices::num_batches(self.strategy.index_space(&self.ctx), self.batch_size)
    }

    /// Number of epochs begun so far
    pub fn epochs_started(&self) -> usize {
        self.epochs_started
    }

    /// Produce the next batch, starting a new epoch when the current one is spent
    pub fn next_batch(&mut self) -> Result<Batch> {
        if self.pending.is_empty() {
            let plan = self.strategy.plan_epoch(
                &self.ctx,
                self.batch_size,
                self.shuffle_batches,
                &mut self.rng,
            )?;
            self.pending = plan.into();
            self.epochs_started += 1;
            debug!(
                mode = %self.strategy.mode(),
                epoch = self.epochs_started - 1,
                batches = self.pending.len(),
                "starting epoch"
            );
        }

        let positions = self
            .pending
            .pop_front()
            .ok_or_else(|| SslDataError::config("epoch plan contains no batches"))?;
        self.materialize(&positions)
    }

    fn materialize(&mut self, positions: &[usize]) -> Result<Batch> {
        let rows = self.strategy.resolve(&self.ctx, positions);
        let pixel_len = self.geometry.pixel_len();

        let flat = self.ctx.store.read_rows(&self.images_key, &rows)?;
        if flat.len() != rows.len() * pixel_len {
            return Err(SslDataError::store(
                &self.images_key,
                format!(
                    "read {} values for {} rows of {} pixels",
                    flat.len(),
                    rows.len(),
                    pixel_len
                ),
            ));
        }

        let mut images = Vec::with_capacity(flat.len());
        for image in flat.chunks_exact(pixel_len) {
            let transformed = self
                .transform
                .transform(image.to_vec(), self.geometry, &mut self.rng)?;
            images.extend(transformed);
        }

        let labels = self.strategy.fetch_labels(&self.ctx, &rows)?;
        if labels.len() != rows.len() * self.label_width {
            return Err(SslDataError::config(format!(
                "fetched {} label values for {} rows of width {}",
                labels.len(),
                rows.len(),
                self.label_width
            )));
        }

        Ok(Batch::new(
            images,
            labels,
            rows,
            self.geometry,
            self.label_width,
            self.epochs_started - 1,
        ))
    }
}

impl<R: RngCore> Iterator for BatchStream<'_, R> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}
