//! # Multi-label SSL data handling
//!
//! Data preparation for training multi-label image classifiers under partial
//! supervision.
//!
//! ## Features
//!
//! - **Label-balanced partitioning** of the training split into labeled and
//!   unlabeled examples at a target ratio
//! - **Label corruption** of a fraction of the labeled rows, drawn from the
//!   corpus class frequencies
//! - **Infinite batch streams** in six sampling modes, including a mixed mode
//!   interleaving labeled and unlabeled examples with externally published
//!   labels
//! - **Augmentation gateway** (flip/shift/zoom plus mean centering)
//! - **Burn tensor bridge** and the normalized loss contract
//!
//! ## Modules
//!
//! - `dataset`: store adapters, label matrices, partitioning, corruption, augmentation
//! - `sampler`: sampling modes, index generation, batch streams, mixed labels
//! - `handler`: the `DataHandler` tying everything together
//! - `loss`: normalized loss/gradient contract
//! - `utils`: logging, errors and helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use multilabel_ssl::{
//!     BatchRequest, DataHandler, DatasetId, DirectoryStore, HandlerConfig, SamplingMode,
//! };
//!
//! let store = DirectoryStore::open("data".as_ref(), DatasetId::MsCoco)?;
//! let config = HandlerConfig::new(DatasetId::MsCoco).with_labeled_ratio(10.0);
//! let handler = DataHandler::from_seed(config, store)?;
//!
//! let mut stream = handler.stream_seeded(BatchRequest::new(SamplingMode::TrainLabeled), 7)?;
//! let batch = stream.next_batch()?;
//! ```

pub mod config;
pub mod dataset;
pub mod handler;
pub mod loss;
pub mod sampler;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::HandlerConfig;
pub use dataset::{
    AugmentationConfig, CorruptionReport, DatasetId, DatasetStore, DirectoryStore, ImageGeometry,
    ImageTransform, LabelMatrix, LabelPartition, MemoryStore, PartitionStats, Preprocessor, Split,
};
pub use handler::DataHandler;
pub use loss::{LossKernel, NormalizedLoss, NORM_FACTOR};
pub use sampler::{
    Batch, BatchRequest, BatchStream, MixedLabelChannel, SamplingMode, TensorBatch,
};
pub use utils::error::{Result, SslDataError};
