//! Label-balanced labeled/unlabeled partitioning
//!
//! Simulates partial supervision: only a fraction of the training examples
//! keep trusted labels. The labeled set is drawn class by class so rare
//! classes stay represented, then the per-class rate is tuned until the
//! realized fraction of *examples* lands just above the requested one.
//!
//! ## Search
//!
//! 1. For every class, take `round(positives * working_ratio / 100)` of its
//!    positive examples after a fresh shuffle
//! 2. Union the candidates of all classes (an example carrying several
//!    classes counts once)
//! 3. Compare the realized ratio against the target band
//!    `[target, target + tolerance]` and nudge the working ratio:
//!    large overshoot steps down coarsely, small overshoot and undershoot step
//!    finely
//!
//! The search is capped; exceeding the cap is reported as
//! [`SslDataError::ConvergenceExhaustion`].

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::labels::LabelMatrix;
use crate::utils::error::{Result, SslDataError};

/// Tuning of the labeled-ratio search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Accepted overshoot above the target, in percentage points
    pub tolerance: f64,
    /// Overshoot beyond which the coarse step is used
    pub coarse_threshold: f64,
    /// Coarse decrease of the working ratio
    pub coarse_step: f64,
    /// Fine increase/decrease of the working ratio
    pub fine_step: f64,
    /// Safety cap on search iterations
    pub max_iterations: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.5,
            coarse_threshold: 5.0,
            coarse_step: 2.5,
            fine_step: 0.25,
            max_iterations: 10_000,
        }
    }
}

/// Disjoint labeled/unlabeled index sets over the training split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelPartition {
    /// Labeled examples in construction order
    labeled: Vec<usize>,
    /// Complement of `labeled`, ascending
    unlabeled: Vec<usize>,
    /// `labeled`, ascending
    labeled_sorted: Vec<usize>,
    num_examples: usize,
    iterations: usize,
}

impl LabelPartition {
    /// Every example labeled
    pub fn full(num_examples: usize) -> Self {
        let all: Vec<usize> = (0..num_examples).collect();
        Self {
            labeled: all.clone(),
            unlabeled: Vec::new(),
            labeled_sorted: all,
            num_examples,
            iterations: 0,
        }
    }

    /// Build from an explicit labeled set; the unlabeled set is its complement
    pub fn from_labeled(labeled: Vec<usize>, num_examples: usize) -> Result<Self> {
        let mut mask = vec![false; num_examples];
        for &index in &labeled {
            if index >= num_examples {
                return Err(SslDataError::config(format!(
                    "labeled index {} out of range for {} examples",
                    index, num_examples
                )));
            }
            if mask[index] {
                return Err(SslDataError::config(format!(
                    "labeled index {} listed twice",
                    index
                )));
            }
            mask[index] = true;
        }
        Ok(Self::from_mask(labeled, &mask, 0))
    }

    fn from_mask(labeled: Vec<usize>, mask: &[bool], iterations: usize) -> Self {
        let unlabeled = mask
            .iter()
            .enumerate()
            .filter_map(|(index, &is_labeled)| (!is_labeled).then_some(index))
            .collect();
        let mut labeled_sorted = labeled.clone();
        labeled_sorted.sort_unstable();

        Self {
            labeled,
            unlabeled,
            labeled_sorted,
            num_examples: mask.len(),
            iterations,
        }
    }

    /// Draw a partition reaching `labeled_ratio` percent of the examples
    ///
    /// # Arguments
    /// * `labels` - Training label matrix
    /// * `labeled_ratio` - Target percentage in (0, 100]
    /// * `config` - Search tuning
    /// * `rng` - Random source for the per-class shuffles
    pub fn compute<R: Rng + ?Sized>(
        labels: &LabelMatrix,
        labeled_ratio: f64,
        config: &PartitionConfig,
        rng: &mut R,
    ) -> Result<Self> {
        if !(labeled_ratio > 0.0 && labeled_ratio <= 100.0) {
            return Err(SslDataError::config(format!(
                "labeled ratio must be in (0, 100], got {}",
                labeled_ratio
            )));
        }

        let num_examples = labels.num_examples();
        if labeled_ratio == 100.0 {
            info!("Labeled ratio is 100%, every one of {} examples is labeled", num_examples);
            return Ok(Self::full(num_examples));
        }
        if num_examples == 0 {
            return Err(SslDataError::config("cannot partition an empty training split"));
        }

        let positives: Vec<Vec<usize>> = (0..labels.num_classes())
            .map(|class| labels.positives_of_class(class))
            .collect();

        let mut working_ratio = labeled_ratio;
        let mut realized = 0.0;

        for iteration in 1..=config.max_iterations {
            let (labeled, mask) = draw_candidates(&positives, num_examples, working_ratio, rng);
            realized = labeled.len() as f64 / num_examples as f64 * 100.0;

            debug!(
                iteration,
                working_ratio,
                realized,
                labeled = labeled.len(),
                "partition search step"
            );

            if realized > labeled_ratio + config.coarse_threshold {
                working_ratio -= config.coarse_step;
            } else if realized > labeled_ratio + config.tolerance {
                working_ratio -= config.fine_step;
            } else if realized < labeled_ratio {
                working_ratio += config.fine_step;
            } else {
                if iteration > 1000 {
                    warn!("Partition search needed {} iterations", iteration);
                }
                info!(
                    "Labeled {} of {} examples ({:.2}%, target {:.2}%) after {} iterations",
                    labeled.len(),
                    num_examples,
                    realized,
                    labeled_ratio,
                    iteration
                );
                return Ok(Self::from_mask(labeled, &mask, iteration));
            }
        }

        Err(SslDataError::ConvergenceExhaustion {
            iterations: config.max_iterations,
            target: labeled_ratio,
            realized,
        })
    }

    pub fn labeled(&self) -> &[usize] {
        &self.labeled
    }

    pub fn unlabeled(&self) -> &[usize] {
        &self.unlabeled
    }

    pub fn labeled_sorted(&self) -> &[usize] {
        &self.labeled_sorted
    }

    pub fn num_examples(&self) -> usize {
        self.num_examples
    }

    /// Search iterations used (0 when no search ran)
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Realized labeled percentage of examples
    pub fn realized_ratio(&self) -> f64 {
        if self.num_examples == 0 {
            return 0.0;
        }
        self.labeled.len() as f64 / self.num_examples as f64 * 100.0
    }

    /// Summary against the label matrix the partition was drawn from
    pub fn stats(&self, labels: &LabelMatrix) -> PartitionStats {
        let classes_covered = (0..labels.num_classes())
            .filter(|&class| {
                self.labeled
                    .iter()
                    .any(|&index| labels.is_positive(index, class))
            })
            .count();

        PartitionStats {
            num_examples: self.num_examples,
            num_labeled: self.labeled.len(),
            num_unlabeled: self.unlabeled.len(),
            realized_ratio: self.realized_ratio(),
            iterations: self.iterations,
            num_classes: labels.num_classes(),
            classes_covered,
        }
    }

    /// Save to a JSON file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from a JSON file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// One trial draw at `working_ratio`: per-class candidates, deduplicated in
/// first-occurrence order, plus the membership mask.
fn draw_candidates<R: Rng + ?Sized>(
    positives: &[Vec<usize>],
    num_examples: usize,
    working_ratio: f64,
    rng: &mut R,
) -> (Vec<usize>, Vec<bool>) {
    let mut mask = vec![false; num_examples];
    let mut labeled = Vec::new();

    for class_positives in positives {
        let available = class_positives.len();
        // numpy rounds half to even
        let wanted = (available as f64 * (working_ratio / 100.0)).round_ties_even();
        let take = wanted.clamp(0.0, available as f64) as usize;

        let mut shuffled = class_positives.clone();
        shuffled.shuffle(rng);

        for &index in &shuffled[..take] {
            if !mask[index] {
                mask[index] = true;
                labeled.push(index);
            }
        }
    }

    (labeled, mask)
}

/// Statistics about a partition
#[derive(Debug, Clone)]
pub struct PartitionStats {
    pub num_examples: usize,
    pub num_labeled: usize,
    pub num_unlabeled: usize,
    pub realized_ratio: f64,
    pub iterations: usize,
    pub num_classes: usize,
    /// Classes with at least one labeled positive example
    pub classes_covered: usize,
}

impl fmt::Display for PartitionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Partition Statistics:")?;
        writeln!(f, "  Training examples: {}", self.num_examples)?;
        writeln!(f, "  Labeled: {} ({:.2}%)", self.num_labeled, self.realized_ratio)?;
        writeln!(f, "  Unlabeled: {}", self.num_unlabeled)?;
        writeln!(
            f,
            "  Classes covered: {}/{}",
            self.classes_covered, self.num_classes
        )?;
        writeln!(f, "  Search iterations: {}", self.iterations)?;
        Ok(())
    }
}
