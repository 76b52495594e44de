//! Dense multi-label matrices
//!
//! Rows are examples, columns are classes. Training and validation labels are
//! binary (0.0 / 1.0); mixed labels carry one extra trailing weight column.

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, SslDataError};

/// Row-major f32 label matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMatrix {
    num_examples: usize,
    num_classes: usize,
    data: Vec<f32>,
}

impl LabelMatrix {
    /// All-zero matrix
    pub fn zeros(num_examples: usize, num_classes: usize) -> Self {
        Self {
            num_examples,
            num_classes,
            data: vec![0.0; num_examples * num_classes],
        }
    }

    /// Wrap flattened row-major values
    pub fn from_flat(num_examples: usize, num_classes: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != num_examples * num_classes {
            return Err(SslDataError::config(format!(
                "label data has {} values, expected {} x {}",
                data.len(),
                num_examples,
                num_classes
            )));
        }
        Ok(Self {
            num_examples,
            num_classes,
            data,
        })
    }

    /// Build from per-example lists of positive class indices
    pub fn from_positive_classes(num_classes: usize, positives: &[Vec<usize>]) -> Result<Self> {
        let mut matrix = Self::zeros(positives.len(), num_classes);
        for (row, classes) in positives.iter().enumerate() {
            for &class in classes {
                if class >= num_classes {
                    return Err(SslDataError::config(format!(
                        "class {} out of range for {} classes",
                        class, num_classes
                    )));
                }
                matrix.row_mut(row)[class] = 1.0;
            }
        }
        Ok(matrix)
    }

    pub fn num_examples(&self) -> usize {
        self.num_examples
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.num_classes..(index + 1) * self.num_classes]
    }

    pub fn row_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.data[index * self.num_classes..(index + 1) * self.num_classes]
    }

    /// Whether example `index` is positive for `class`
    pub fn is_positive(&self, index: usize, class: usize) -> bool {
        self.data[index * self.num_classes + class] == 1.0
    }

    /// Examples positive for `class`, ascending
    pub fn positives_of_class(&self, class: usize) -> Vec<usize> {
        (0..self.num_examples)
            .filter(|&row| self.is_positive(row, class))
            .collect()
    }

    /// Number of positive examples per class
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes];
        for row in self.data.chunks_exact(self.num_classes.max(1)) {
            for (count, &value) in counts.iter_mut().zip(row) {
                if value == 1.0 {
                    *count += 1;
                }
            }
        }
        counts
    }

    /// Fraction of all examples positive for each class
    pub fn class_frequencies(&self) -> Vec<f64> {
        let total = self.num_examples.max(1) as f64;
        self.class_counts()
            .into_iter()
            .map(|count| count as f64 / total)
            .collect()
    }

    /// Gather rows into a flat buffer, in the given order
    pub fn gather(&self, indices: &[usize]) -> Vec<f32> {
        let mut out = Vec::with_capacity(indices.len() * self.num_classes);
        for &index in indices {
            out.extend_from_slice(self.row(index));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LabelMatrix {
        LabelMatrix::from_positive_classes(3, &[vec![0], vec![0, 2], vec![], vec![1, 2]]).unwrap()
    }

    #[test]
    fn test_class_counts_and_frequencies() {
        let labels = sample();
        assert_eq!(labels.class_counts(), vec![2, 1, 2]);
        assert_eq!(labels.class_frequencies(), vec![0.5, 0.25, 0.5]);
    }

    #[test]
    fn test_positives_of_class() {
        let labels = sample();
        assert_eq!(labels.positives_of_class(2), vec![1, 3]);
        assert!(labels.positives_of_class(1).contains(&3));
    }

    #[test]
    fn test_gather_rows() {
        let labels = sample();
        assert_eq!(labels.gather(&[3, 0]), vec![0., 1., 1., 1., 0., 0.]);
    }

    #[test]
    fn test_from_flat_validates_length() {
        assert!(LabelMatrix::from_flat(2, 3, vec![0.0; 5]).is_err());
        assert!(LabelMatrix::from_positive_classes(2, &[vec![2]]).is_err());
    }
}
