//! Label corruption for noisy-annotation simulation
//!
//! A fraction of the *labeled* rows is replaced by label vectors drawn from
//! the corpus class marginals, independent of the original labels:
//!
//! - `class_prob[c]` is the fraction of training examples positive for `c`
//! - per corrupted row, class `c` is switched on when `class_prob[c]` beats a
//!   fresh uniform draw, redrawing the whole vector until at least one class
//!   is on
//!
//! Unlabeled rows are never touched.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::labels::LabelMatrix;
use crate::utils::error::{Result, SslDataError};

/// Which rows were rewritten
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorruptionReport {
    /// Requested percentage of labeled rows to corrupt
    pub corruption_ratio: f64,
    /// Rewritten row indices, in selection order
    pub corrupted: Vec<usize>,
}

impl CorruptionReport {
    pub fn count(&self) -> usize {
        self.corrupted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corrupted.is_empty()
    }
}

/// Corrupt `floor(|labeled| * corruption_ratio / 100)` labeled rows of `labels`
///
/// # Arguments
/// * `labels` - Training labels; consumed, the corrupted matrix is returned
/// * `labeled` - Labeled example indices (the only eligible rows)
/// * `corruption_ratio` - Percentage in [0, 100]
/// * `rng` - Random source for the row selection and the label draws
pub fn corrupt_labels<R: Rng + ?Sized>(
    mut labels: LabelMatrix,
    labeled: &[usize],
    corruption_ratio: f64,
    rng: &mut R,
) -> Result<(LabelMatrix, CorruptionReport)> {
    if !(0.0..=100.0).contains(&corruption_ratio) {
        return Err(SslDataError::config(format!(
            "corruption ratio must be in [0, 100], got {}",
            corruption_ratio
        )));
    }

    let mut report = CorruptionReport {
        corruption_ratio,
        corrupted: Vec::new(),
    };
    if corruption_ratio == 0.0 {
        return Ok((labels, report));
    }

    let mut selected = labeled.to_vec();
    selected.shuffle(rng);
    selected.truncate((labeled.len() as f64 * corruption_ratio / 100.0).floor() as usize);

    if selected.is_empty() {
        return Ok((labels, report));
    }

    let class_prob = labels.class_frequencies();
    if class_prob.iter().all(|&p| p <= 0.0) {
        return Err(SslDataError::config(
            "no class has a positive example, corrupted labels cannot be drawn",
        ));
    }

    let mut pos_classes = vec![false; class_prob.len()];
    for &row in &selected {
        loop {
            for (on, &p) in pos_classes.iter_mut().zip(&class_prob) {
                let pos_prob = 1.0 - rng.gen::<f64>();
                *on = p > pos_prob;
            }
            if pos_classes.iter().any(|&on| on) {
                break;
            }
        }

        for (value, &on) in labels.row_mut(row).iter_mut().zip(&pos_classes) {
            *value = if on { 1.0 } else { 0.0 };
        }
    }

    info!(
        "Corrupted {} of {} labeled rows ({:.1}%)",
        selected.len(),
        labeled.len(),
        corruption_ratio
    );
    report.corrupted = selected;
    Ok((labels, report))
}
