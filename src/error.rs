// src/error.rs
//! Structural failures surfaced by blocks and their storage.
//!
//! Numeric advisories (negative or non-finite sample values) are never
//! reported through this type; they go to the `log` facade instead.

/// Errors returned by [`ImageBlock`](crate::ImageBlock) and
/// [`TensorStorage`](crate::tensor::TensorStorage) operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BlockError {
    #[error("incompatible channel count: expected {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        got: [usize; 3],
    },

    #[error("merge source has no weight plane but the target normalizes")]
    WeightPlaneMismatch,

    #[error("blocks do not overlap: source at {source_origin:?} ({source_extent:?}), target extent {target_extent:?}")]
    NoOverlap {
        source_origin: [i64; 2],
        source_extent: [usize; 2],
        target_extent: [usize; 2],
    },

    #[error("cannot allocate storage of {height} x {width} x {channels}")]
    Allocation {
        height: usize,
        width: usize,
        channels: usize,
    },

    #[error("cell ({row}, {col}) is outside the {height} x {width} storage extent")]
    OutOfBounds {
        row: i64,
        col: i64,
        height: usize,
        width: usize,
    },

    #[error("channel {channel} is out of range for {channels} channels")]
    ChannelOutOfRange { channel: usize, channels: usize },

    #[error("snapshot generation {snapshot} is stale (storage is at generation {current})")]
    StaleGeneration { snapshot: u64, current: u64 },

    #[error("a block needs at least one channel")]
    InvalidChannelCount,
}

impl BlockError {
    pub fn channel_mismatch(expected: usize, got: usize) -> Self {
        BlockError::ChannelMismatch { expected, got }
    }

    pub fn out_of_bounds(row: i64, col: i64, height: usize, width: usize) -> Self {
        BlockError::OutOfBounds {
            row,
            col,
            height,
            width,
        }
    }
}

/// Result type alias for block operations
pub type BlockResult<T> = Result<T, BlockError>;
