//! Normalized loss contract
//!
//! The training loss is an opaque kernel supplying two functions of
//! `(y_true, y_pred)`: a scalar loss and a per-element gradient multiplier.
//! Both are divided by the same fixed [`NORM_FACTOR`]; the gradient with
//! respect to the predictions is `upstream * multiplier / NORM_FACTOR` and the
//! true labels receive no gradient.

use crate::utils::error::{Result, SslDataError};

/// Fixed normalization of loss and gradient
pub const NORM_FACTOR: f32 = 20.0;

/// Loss kernel over flattened `batch x classes` label batches
pub trait LossKernel {
    /// Unnormalized scalar loss
    fn loss(&self, y_true: &[f32], y_pred: &[f32], num_classes: usize) -> f32;

    /// Unnormalized d(loss)/d(y_pred), same length as `y_pred`
    fn grad_multiplier(&self, y_true: &[f32], y_pred: &[f32], num_classes: usize) -> Vec<f32>;
}

/// A kernel wrapped with the fixed normalization
#[derive(Debug, Clone)]
pub struct NormalizedLoss<K> {
    kernel: K,
}

impl<K: LossKernel> NormalizedLoss<K> {
    pub fn new(kernel: K) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// `kernel.loss / NORM_FACTOR`
    pub fn forward(&self, y_true: &[f32], y_pred: &[f32], num_classes: usize) -> Result<f32> {
        check_shapes(y_true, y_pred, num_classes)?;
        Ok(self.kernel.loss(y_true, y_pred, num_classes) / NORM_FACTOR)
    }

    /// Gradient w.r.t. `y_pred` given the upstream gradient of the scalar loss
    pub fn backward(
        &self,
        y_true: &[f32],
        y_pred: &[f32],
        num_classes: usize,
        upstream: f32,
    ) -> Result<Vec<f32>> {
        check_shapes(y_true, y_pred, num_classes)?;
        let multiplier = self.kernel.grad_multiplier(y_true, y_pred, num_classes);
        if multiplier.len() != y_pred.len() {
            return Err(SslDataError::config(format!(
                "gradient multiplier has {} values for {} predictions",
                multiplier.len(),
                y_pred.len()
            )));
        }
        Ok(multiplier
            .into_iter()
            .map(|m| upstream * m / NORM_FACTOR)
            .collect())
    }
}

fn check_shapes(y_true: &[f32], y_pred: &[f32], num_classes: usize) -> Result<()> {
    if num_classes == 0 || y_true.len() != y_pred.len() || y_pred.len() % num_classes != 0 {
        return Err(SslDataError::config(format!(
            "label batches of {} and {} values do not form rows of {} classes",
            y_true.len(),
            y_pred.len(),
            num_classes
        )));
    }
    Ok(())
}
