//! Error Handling Module
//!
//! Defines the error taxonomy for partitioning, corruption and batch sampling.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Main error type for multi-label data handling
#[derive(Error, Debug)]
pub enum SslDataError {
    /// Unsupported dataset, ratio out of range, batch size larger than an index space, ...
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Failure reported by the dataset store. Never retried.
    #[error("Store access error on '{collection}': {message}")]
    StoreAccess {
        /// Collection key that was being read (e.g. `train_images`)
        collection: String,
        /// Underlying failure description
        message: String,
    },

    /// The labeled/unlabeled search did not settle within its iteration cap
    #[error(
        "Partition search did not converge after {iterations} iterations \
         (target {target:.2}%, last realized {realized:.2}%)"
    )]
    ConvergenceExhaustion {
        iterations: usize,
        target: f64,
        realized: f64,
    },

    /// Mixed labels missing or shaped inconsistently with the training split
    #[error("Mixed labels error: {0}")]
    MixedLabels(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SslDataError {
    /// Shorthand for a store failure on a collection
    pub fn store(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreAccess {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an invalid configuration
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

impl From<serde_json::Error> for SslDataError {
    fn from(err: serde_json::Error) -> Self {
        SslDataError::Serialization(err.to_string())
    }
}

/// Convenience Result type for this crate
pub type Result<T> = std::result::Result<T, SslDataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SslDataError::config("batch size 64 exceeds index space of 10");
        assert_eq!(
            format!("{}", err),
            "Invalid configuration: batch size 64 exceeds index space of 10"
        );
    }

    #[test]
    fn test_store_error_names_collection() {
        let err = SslDataError::store("train_images", "row 12 out of range");
        let msg = err.to_string();
        assert!(msg.contains("train_images"));
        assert!(msg.contains("row 12"));
    }

    #[test]
    fn test_convergence_error_display() {
        let err = SslDataError::ConvergenceExhaustion {
            iterations: 100,
            target: 10.0,
            realized: 12.5,
        };
        assert!(err.to_string().contains("100 iterations"));
    }
}
