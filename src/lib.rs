// src/lib.rs
//! Filtered accumulation buffers for Monte Carlo rendering.
//!
//! An [`ImageBlock`] collects radiance samples for one tile of an image,
//! splatting each through a [`ReconstructionFilter`](filter::ReconstructionFilter)
//! into a height x width x channel tensor with a border for wide filters.
//! Tiles are merged into a frame with [`ImageBlock::put_block`].

pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod image_block;
pub mod policy;
pub mod spectrum;
pub mod tensor;

pub use config::{Backend, BlockConfig};
pub use error::{BlockError, BlockResult};
pub use filter::{BoxFilter, GaussianFilter, ReconstructionFilter, TentFilter};
pub use image_block::{DiagnosticCounts, ImageBlock, Sample};
pub use spectrum::{Passthrough, SpectralResponse};
pub use tensor::{Tensor, TensorSnapshot, TensorView, TensorViewMut};
