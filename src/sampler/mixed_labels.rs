//! Mixed label channel
//!
//! Mixed labels are produced outside this crate (e.g. by a pretrained model
//! scoring the unlabeled pool) and published here between epochs. The
//! channel is a single-writer buffer: every publish bumps a version, and the
//! mixed sampler takes an immutable snapshot at the start of each epoch, so a
//! publish never changes labels under an epoch in flight.

use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::dataset::labels::LabelMatrix;
use crate::utils::error::{Result, SslDataError};

#[derive(Debug, Default)]
struct ChannelState {
    version: u64,
    labels: Option<Arc<LabelMatrix>>,
}

/// Shared, versioned buffer of mixed labels (N x (C + 1))
///
/// Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct MixedLabelChannel {
    num_examples: usize,
    label_width: usize,
    state: Arc<RwLock<ChannelState>>,
}

/// Immutable view of one published version
#[derive(Debug, Clone)]
pub struct MixedLabelSnapshot {
    version: u64,
    labels: Arc<LabelMatrix>,
}

impl MixedLabelSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn labels(&self) -> &LabelMatrix {
        &self.labels
    }
}

impl MixedLabelChannel {
    /// Empty channel expecting `num_examples` rows of `label_width` values
    pub fn new(num_examples: usize, label_width: usize) -> Self {
        Self {
            num_examples,
            label_width,
            state: Arc::new(RwLock::new(ChannelState::default())),
        }
    }

    pub fn num_examples(&self) -> usize {
        self.num_examples
    }

    pub fn label_width(&self) -> usize {
        self.label_width
    }

    /// Replace the mixed labels, returning the new version
    pub fn publish(&self, labels: LabelMatrix) -> Result<u64> {
        if labels.num_examples() != self.num_examples || labels.num_classes() != self.label_width {
            return Err(SslDataError::MixedLabels(format!(
                "expected {} x {} mixed labels, got {} x {}",
                self.num_examples,
                self.label_width,
                labels.num_examples(),
                labels.num_classes()
            )));
        }

        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.version += 1;
        state.labels = Some(Arc::new(labels));
        debug!("Published mixed labels version {}", state.version);
        Ok(state.version)
    }

    /// Number of publishes so far (0 = nothing published)
    pub fn version(&self) -> Result<u64> {
        Ok(self.state.read().map_err(|_| poisoned())?.version)
    }

    /// Current labels; fails until something has been published
    pub fn snapshot(&self) -> Result<MixedLabelSnapshot> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let labels = state.labels.clone().ok_or_else(|| {
            SslDataError::MixedLabels("no mixed labels have been published".to_string())
        })?;
        Ok(MixedLabelSnapshot {
            version: state.version,
            labels,
        })
    }
}

fn poisoned() -> SslDataError {
    SslDataError::MixedLabels("channel lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_before_publish_fails() {
        let channel = MixedLabelChannel::new(4, 3);
        assert_eq!(channel.version().unwrap(), 0);
        assert!(matches!(channel.snapshot(), Err(SslDataError::MixedLabels(_))));
    }

    #[test]
    fn test_publish_checks_shape() {
        let channel = MixedLabelChannel::new(4, 3);
        assert!(channel.publish(LabelMatrix::zeros(4, 2)).is_err());
        assert!(channel.publish(LabelMatrix::zeros(5, 3)).is_err());
        assert_eq!(channel.publish(LabelMatrix::zeros(4, 3)).unwrap(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_publish() {
        let channel = MixedLabelChannel::new(2, 2);
        channel.publish(LabelMatrix::zeros(2, 2)).unwrap();
        let snapshot = channel.snapshot().unwrap();

        let writer = channel.clone();
        writer
            .publish(LabelMatrix::from_flat(2, 2, vec![1.0; 4]).unwrap())
            .unwrap();

        assert_eq!(snapshot.version(), 1);
        assert!(snapshot.labels().as_slice().iter().all(|&v| v == 0.0));
        assert_eq!(channel.version().unwrap(), 2);
        assert!(channel.snapshot().unwrap().labels().as_slice().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_poisoned_channel_reports_error() {
        let channel = MixedLabelChannel::new(2, 2);
        channel.publish(LabelMatrix::zeros(2, 2)).unwrap();

        let writer = channel.clone();
        let _ = std::thread::spawn(move || {
            let _guard = writer.state.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(matches!(channel.version(), Err(SslDataError::MixedLabels(_))));
        assert!(matches!(channel.snapshot(), Err(SslDataError::MixedLabels(_))));
    }
}
