// src/policy.rs
//! How a single contribution is folded into a storage cell.

use crate::tensor::AtomicF32;
use std::fmt;

/// Accumulation strategy shared by every write path of a block.
pub trait AccumulatePolicy: Send + Sync + fmt::Debug {
    /// Add `value` to `cell` and return the resulting cell value.
    fn add(&self, cell: &AtomicF32, value: f32) -> f32;

    /// Whether concurrent calls on the same cell are lossless.
    fn is_atomic(&self) -> bool;
}

/// Compare-and-swap accumulation. Concurrent writers never lose updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicAdd;

impl AccumulatePolicy for AtomicAdd {
    fn add(&self, cell: &AtomicF32, value: f32) -> f32 {
        cell.fetch_add(value) + value
    }

    fn is_atomic(&self) -> bool {
        true
    }
}

/// Plain read-modify-write. The caller guarantees one writer per block.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialAdd;

impl AccumulatePolicy for SequentialAdd {
    fn add(&self, cell: &AtomicF32, value: f32) -> f32 {
        let sum = cell.load() + value;
        cell.store(sum);
        sum
    }

    fn is_atomic(&self) -> bool {
        false
    }
}

static ATOMIC_ADD: AtomicAdd = AtomicAdd;
static SEQUENTIAL_ADD: SequentialAdd = SequentialAdd;

/// Policy matching a block's `coalesce` flag.
pub fn select(coalesce: bool) -> &'static dyn AccumulatePolicy {
    if coalesce {
        &ATOMIC_ADD
    } else {
        &SEQUENTIAL_ADD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn both_policies_report_the_new_value() {
        let cell = AtomicF32::new(1.5);
        assert_eq!(SequentialAdd.add(&cell, 2.0), 3.5);
        assert_eq!(AtomicAdd.add(&cell, -4.0), -0.5);
        assert_eq!(cell.load(), -0.5);
    }

    #[test]
    fn atomic_add_survives_contention() {
        let cell = AtomicF32::new(0.0);
        (0..10_000).into_par_iter().for_each(|_| {
            AtomicAdd.add(&cell, 1.0);
        });
        assert_eq!(cell.load(), 10_000.0);
    }

    #[test]
    fn select_follows_coalesce_flag() {
        assert!(select(true).is_atomic());
        assert!(!select(false).is_atomic());
    }
}
