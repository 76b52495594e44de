//! Index generation for batch streams
//!
//! Pure functions laying out one epoch over an index space of size `n`.
//! Positions produced here index into a mode's index list; strategies map
//! them to store rows.

use std::ops::Range;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::utils::error::{Result, SslDataError};

/// Reject batch sizes that cannot be served from `n` examples
pub fn check_batch_size(n: usize, batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(SslDataError::config("batch size must be at least 1"));
    }
    if batch_size > n {
        return Err(SslDataError::config(format!(
            "batch size {} exceeds index space of {}",
            batch_size, n
        )));
    }
    Ok(())
}

/// `ceil(n / batch_size)`
pub fn num_batches(n: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    n.div_ceil(batch_size)
}

/// Positions covered by batch `batch` of an epoch.
///
/// The final batch is always the last `batch_size` positions `[n - bs, n)`,
/// so it overlaps the one before it whenever `n` is not a multiple of the
/// batch size.
pub fn batch_window(batch: usize, n: usize, batch_size: usize) -> Result<Range<usize>> {
    check_batch_size(n, batch_size)?;
    let count = num_batches(n, batch_size);
    if batch >= count {
        return Err(SslDataError::config(format!(
            "batch {} out of range for {} batches",
            batch, count
        )));
    }

    if batch == count - 1 {
        Ok(n - batch_size..n)
    } else {
        Ok(batch * batch_size..(batch + 1) * batch_size)
    }
}

/// Visiting order of the batches of one epoch
pub fn batch_order<R: Rng + ?Sized>(count: usize, shuffle: bool, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..count).collect();
    if shuffle {
        order.shuffle(rng);
    }
    order
}

/// Fixed-length slot list for mixed sampling.
///
/// Covers `num_batches(n, bs) * bs` slots: slot `s < n` holds `s`, the
/// overflow slots wrap around to `0, 1, ..`.
pub fn wrapped_slots(n: usize, batch_size: usize) -> Result<Vec<usize>> {
    check_batch_size(n, batch_size)?;
    let total = num_batches(n, batch_size) * batch_size;
    Ok((0..total)
        .map(|slot| if slot < n { slot } else { slot - n })
        .collect())
}

/// Windows of every batch, in visiting order
pub fn epoch_windows<R: Rng + ?Sized>(
    n: usize,
    batch_size: usize,
    shuffle: bool,
    rng: &mut R,
) -> Result<Vec<Range<usize>>> {
    check_batch_size(n, batch_size)?;
    batch_order(num_batches(n, batch_size), shuffle, rng)
        .into_iter()
        .map(|batch| batch_window(batch, n, batch_size))
        .collect()
}
