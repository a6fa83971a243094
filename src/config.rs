// src/config.rs
use serde::{Deserialize, Serialize};

/// Execution backend a block is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// One sample at a time on one thread.
    #[default]
    Scalar,
    /// Many samples in flight at once (threads or wide lanes).
    Vectorized,
}

/// Behaviour flags fixed when an [`ImageBlock`](crate::ImageBlock) is built.
///
/// Border accommodation and per-sample validation are cheap when samples
/// arrive one at a time, and coalescing only pays off when many writers can
/// hit the same pixel together, so the defaults depend on the backend.
/// `normalize` is off for every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    /// Allocate a margin around the block sized from the filter radius.
    pub border: bool,
    /// Track a per-pixel weight sum and divide by it when reading.
    pub normalize: bool,
    /// Accumulate with atomic adds so concurrent puts are safe.
    pub coalesce: bool,
    /// Log the first accumulation that drives a cell negative.
    pub warn_negative: bool,
    /// Log and drop samples carrying NaN or infinite values.
    pub warn_invalid: bool,
}

impl BlockConfig {
    pub fn for_backend(backend: Backend) -> Self {
        let scalar = backend == Backend::Scalar;
        Self {
            border: scalar,
            normalize: false,
            coalesce: !scalar,
            warn_negative: scalar,
            warn_invalid: scalar,
        }
    }

    pub fn with_border(mut self, border: bool) -> Self {
        self.border = border;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_coalesce(mut self, coalesce: bool) -> Self {
        self.coalesce = coalesce;
        self
    }

    pub fn with_warnings(mut self, warn_negative: bool, warn_invalid: bool) -> Self {
        self.warn_negative = warn_negative;
        self.warn_invalid = warn_invalid;
        self
    }
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self::for_backend(Backend::Scalar)
    }
}
