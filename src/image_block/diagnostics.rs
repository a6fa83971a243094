// src/image_block/diagnostics.rs
//! One-shot advisories for physically implausible sample values.

use super::ImageBlock;
use nalgebra::Point2;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Number of advisories raised since the block was created or last cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticCounts {
    /// Samples that drove at least one cell negative.
    pub negative: u64,
    /// Samples dropped for NaN/infinite values or positions.
    pub invalid: u64,
}

#[derive(Debug, Default)]
pub(super) struct Diagnostics {
    negative_logged: AtomicBool,
    invalid_logged: AtomicBool,
    negative: AtomicU64,
    invalid: AtomicU64,
}

impl Diagnostics {
    /// Count a negative sample. Returns true for the one occurrence that was
    /// logged.
    pub(super) fn report_negative(&self, pos: Point2<f32>) -> bool {
        self.negative.fetch_add(1, Ordering::Relaxed);
        let first = !self.negative_logged.swap(true, Ordering::Relaxed);
        if first {
            log::warn!(
                "ImageBlock::put(): sample at ({}, {}) left a negative value in the buffer; \
                 further occurrences are counted but not logged",
                pos.x,
                pos.y
            );
        }
        first
    }

    pub(super) fn report_invalid(&self, pos: Point2<f32>) -> bool {
        self.invalid.fetch_add(1, Ordering::Relaxed);
        let first = !self.invalid_logged.swap(true, Ordering::Relaxed);
        if first {
            log::warn!(
                "ImageBlock::put(): dropped sample at ({}, {}) with NaN or infinite values; \
                 further occurrences are counted but not logged",
                pos.x,
                pos.y
            );
        }
        first
    }

    pub(super) fn reset(&mut self) {
        *self = Self::default();
    }

    fn counts(&self) -> DiagnosticCounts {
        DiagnosticCounts {
            negative: self.negative.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
        }
    }
}

impl ImageBlock {
    pub fn diagnostics(&self) -> DiagnosticCounts {
        self.diagnostics.counts()
    }
}
