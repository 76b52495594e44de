//! Handler configuration
//!
//! Serializable construction parameters of a [`crate::DataHandler`].

use serde::{Deserialize, Serialize};

use crate::dataset::partition::PartitionConfig;
use crate::dataset::DatasetId;
use crate::utils::error::{Result, SslDataError};

/// Construction parameters of a data handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Dataset identity (selects class count and split names)
    pub dataset: DatasetId,
    /// Percentage of training examples keeping labels, in (0, 100]
    pub labeled_ratio: f64,
    /// Percentage of labeled rows to corrupt, in [0, 100]
    pub corruption_ratio: f64,
    /// Examples per batch
    pub batch_size: usize,
    /// Seed for the construction-time random source
    pub seed: u64,
    /// Safety cap on the partition search
    pub max_partition_iterations: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetId::MsCoco,
            labeled_ratio: 100.0,
            corruption_ratio: 0.0,
            batch_size: 32,
            seed: 26,
            max_partition_iterations: 10_000,
        }
    }
}

impl HandlerConfig {
    pub fn new(dataset: DatasetId) -> Self {
        Self {
            dataset,
            ..Self::default()
        }
    }

    pub fn with_labeled_ratio(mut self, labeled_ratio: f64) -> Self {
        self.labeled_ratio = labeled_ratio;
        self
    }

    pub fn with_corruption_ratio(mut self, corruption_ratio: f64) -> Self {
        self.corruption_ratio = corruption_ratio;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.labeled_ratio > 0.0 && self.labeled_ratio <= 100.0) {
            return Err(SslDataError::config(format!(
                "labeled_ratio must be in (0, 100], got {}",
                self.labeled_ratio
            )));
        }
        if !(0.0..=100.0).contains(&self.corruption_ratio) {
            return Err(SslDataError::config(format!(
                "corruption_ratio must be in [0, 100], got {}",
                self.corruption_ratio
            )));
        }
        if self.batch_size == 0 {
            return Err(SslDataError::config("batch_size must be greater than 0"));
        }
        if self.max_partition_iterations == 0 {
            return Err(SslDataError::config(
                "max_partition_iterations must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Partition search tuning derived from this config
    pub fn partition_config(&self) -> PartitionConfig {
        PartitionConfig {
            max_iterations: self.max_partition_iterations,
            ..PartitionConfig::default()
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&json)?;
        // unknown identities are InvalidConfiguration
        if let Some(name) = value.get("dataset").and_then(serde_json::Value::as_str) {
            name.parse::<DatasetId>()?;
        }
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }
}
