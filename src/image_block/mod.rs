// src/image_block/mod.rs

use crate::config::BlockConfig;
use crate::error::{BlockError, BlockResult};
use crate::filter::{FilterAdapter, ReconstructionFilter};
use crate::policy::{self, AccumulatePolicy};
use crate::tensor::{Tensor, TensorSnapshot, TensorStorage, TensorView, TensorViewMut};
use nalgebra::{Point2, Vector2};
use std::sync::Arc;

mod diagnostics;
mod merge;
mod read;
mod splat;

pub use diagnostics::DiagnosticCounts;
pub use splat::Sample;

use diagnostics::Diagnostics;

/// Accumulation buffer for one rectangular region of the output image.
///
/// The block covers `size` pixels starting at `offset` in image space, plus
/// `border_size` pixels of margin on every side so that filter footprints
/// reaching past the region are not lost. Samples are splatted through the
/// reconstruction filter into a height x width x channel tensor.
///
/// `put`, `read` and `put_block` work through `&self`. They are safe to call
/// from many threads when the block coalesces; otherwise the caller keeps a
/// single writer. Reallocation, clearing and repositioning need `&mut self`.
#[derive(Debug)]
pub struct ImageBlock {
    offset: Point2<i32>,
    size: Vector2<u32>,
    border_size: u32,
    channel_count: usize,
    rfilter: Option<Arc<dyn ReconstructionFilter>>,
    adapter: FilterAdapter,
    config: BlockConfig,
    policy: &'static dyn AccumulatePolicy,
    storage: TensorStorage,
    diagnostics: Diagnostics,
}

impl ImageBlock {
    /// Create a zeroed block of `size` interior pixels.
    pub fn new(
        offset: Point2<i32>,
        size: Vector2<u32>,
        channel_count: usize,
        rfilter: Option<Arc<dyn ReconstructionFilter>>,
        config: BlockConfig,
    ) -> BlockResult<Self> {
        if channel_count == 0 {
            return Err(BlockError::InvalidChannelCount);
        }
        let adapter = FilterAdapter::new(rfilter.clone());
        let border_size = if config.border { adapter.border_size() } else { 0 };
        let margin = 2 * border_size as usize;
        let storage = TensorStorage::new(
            size.y as usize + margin,
            size.x as usize + margin,
            channel_count,
            config.normalize,
        )?;

        Ok(Self {
            offset,
            size,
            border_size,
            channel_count,
            rfilter,
            adapter,
            config,
            policy: policy::select(config.coalesce),
            storage,
            diagnostics: Diagnostics::default(),
        })
    }

    /// Adopt an existing tensor as storage. The tensor includes the border,
    /// so the interior size is its extent minus twice the border size.
    pub fn from_tensor(
        offset: Point2<i32>,
        tensor: Tensor,
        rfilter: Option<Arc<dyn ReconstructionFilter>>,
        config: BlockConfig,
    ) -> BlockResult<Self> {
        let channel_count = tensor.channels();
        if channel_count == 0 {
            return Err(BlockError::InvalidChannelCount);
        }
        let adapter = FilterAdapter::new(rfilter.clone());
        let border_size = if config.border { adapter.border_size() } else { 0 };
        let margin = 2 * border_size as usize;
        if tensor.height() <= margin || tensor.width() <= margin {
            return Err(BlockError::ShapeMismatch {
                expected: [margin + 1, margin + 1, channel_count],
                got: tensor.shape(),
            });
        }
        let size = Vector2::new(
            (tensor.width() - margin) as u32,
            (tensor.height() - margin) as u32,
        );
        let storage = TensorStorage::from_tensor(tensor, config.normalize)?;

        Ok(Self {
            offset,
            size,
            border_size,
            channel_count,
            rfilter,
            adapter,
            config,
            policy: policy::select(config.coalesce),
            storage,
            diagnostics: Diagnostics::default(),
        })
    }

    /// Zero the storage. Offset, size, filter and flags are kept.
    pub fn clear(&mut self) {
        self.storage.clear();
        self.diagnostics.reset();
    }

    /// Move the block to another region without reallocating. Contents are
    /// kept; clear first if they should not carry over.
    pub fn set_offset(&mut self, offset: Point2<i32>) {
        self.offset = offset;
    }

    /// Reallocate storage for a new interior size. Contents are discarded.
    pub fn set_size(&mut self, size: Vector2<u32>) -> BlockResult<()> {
        let margin = 2 * self.border_size as usize;
        self.storage.resize(
            size.y as usize + margin,
            size.x as usize + margin,
            self.channel_count,
        )?;
        self.size = size;
        self.diagnostics.reset();
        Ok(())
    }

    pub fn offset(&self) -> Point2<i32> {
        self.offset
    }

    pub fn size(&self) -> Vector2<u32> {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.x
    }

    pub fn height(&self) -> u32 {
        self.size.y
    }

    pub fn rfilter(&self) -> Option<&Arc<dyn ReconstructionFilter>> {
        self.rfilter.as_ref()
    }

    pub fn coalesce(&self) -> bool {
        self.config.coalesce
    }

    pub fn normalize(&self) -> bool {
        self.config.normalize
    }

    pub fn warn_invalid(&self) -> bool {
        self.config.warn_invalid
    }

    pub fn warn_negative(&self) -> bool {
        self.config.warn_negative
    }

    pub fn set_warn_invalid(&mut self, value: bool) {
        self.config.warn_invalid = value;
    }

    pub fn set_warn_negative(&mut self, value: bool) {
        self.config.warn_negative = value;
    }

    pub fn border_size(&self) -> u32 {
        self.border_size
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn config(&self) -> BlockConfig {
        self.config
    }

    pub fn generation(&self) -> u64 {
        self.storage.generation()
    }

    /// Border-inclusive storage, borrowed without copying.
    pub fn tensor(&self) -> TensorView<'_> {
        self.storage.view()
    }

    pub fn tensor_mut(&mut self) -> TensorViewMut<'_> {
        self.storage.view_mut()
    }

    /// Per-pixel weight sums, present when the block normalizes.
    pub fn weights(&self) -> Option<TensorView<'_>> {
        self.storage.weight_view()
    }

    pub fn storage(&self) -> &TensorStorage {
        &self.storage
    }

    pub fn snapshot(&self) -> TensorSnapshot {
        self.storage.snapshot()
    }

    pub fn restore(&mut self, snapshot: &TensorSnapshot) -> BlockResult<()> {
        self.storage.restore(snapshot)
    }

    /// Map an image-space position to continuous storage coordinates.
    fn storage_position(&self, pos: Point2<f32>) -> Point2<f32> {
        let shift = self.border_size as f32;
        Point2::new(
            pos.x - self.offset.x as f32 + shift,
            pos.y - self.offset.y as f32 + shift,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{GaussianFilter, TentFilter};

    fn gaussian() -> Option<Arc<dyn ReconstructionFilter>> {
        Some(Arc::new(GaussianFilter::new(0.5)))
    }

    #[test]
    fn storage_includes_border() {
        let block = ImageBlock::new(
            Point2::new(8, 16),
            Vector2::new(4, 3),
            5,
            gaussian(),
            BlockConfig::default(),
        )
        .unwrap();
        assert_eq!(block.border_size(), 2);
        assert_eq!(block.tensor().shape(), [7, 8, 5]);
        assert_eq!((block.width(), block.height()), (4, 3));
    }

    #[test]
    fn disabling_border_drops_margin() {
        let block = ImageBlock::new(
            Point2::origin(),
            Vector2::new(4, 4),
            3,
            gaussian(),
            BlockConfig::default().with_border(false),
        )
        .unwrap();
        assert_eq!(block.border_size(), 0);
        assert_eq!(block.tensor().shape(), [4, 4, 3]);
        assert!(block.rfilter().is_some());
    }

    #[test]
    fn zero_channels_are_rejected() {
        let result = ImageBlock::new(
            Point2::origin(),
            Vector2::new(2, 2),
            0,
            None,
            BlockConfig::default(),
        );
        assert_eq!(result.unwrap_err(), BlockError::InvalidChannelCount);
    }

    #[test]
    fn zero_size_fails_to_allocate() {
        let result = ImageBlock::new(
            Point2::origin(),
            Vector2::new(0, 2),
            1,
            None,
            BlockConfig::default(),
        );
        assert!(matches!(result, Err(BlockError::Allocation { .. })));
    }

    #[test]
    fn from_tensor_derives_size_and_channels() {
        let tensor = Tensor::zeros([6, 7, 4]).unwrap();
        let block = ImageBlock::from_tensor(
            Point2::new(1, 1),
            tensor,
            Some(Arc::new(TentFilter::new(1.0))),
            BlockConfig::default(),
        )
        .unwrap();
        assert_eq!(block.border_size(), 1);
        assert_eq!(block.size(), Vector2::new(5, 4));
        assert_eq!(block.channel_count(), 4);
    }

    #[test]
    fn from_tensor_smaller_than_border_is_rejected() {
        let tensor = Tensor::zeros([4, 4, 1]).unwrap();
        let result = ImageBlock::from_tensor(
            Point2::origin(),
            tensor,
            gaussian(),
            BlockConfig::default(),
        );
        assert!(matches!(result, Err(BlockError::ShapeMismatch { .. })));
    }

    #[test]
    fn set_size_reallocates_and_bumps_generation() {
        let mut block = ImageBlock::new(
            Point2::origin(),
            Vector2::new(2, 2),
            1,
            None,
            BlockConfig::default(),
        )
        .unwrap();
        block.set_size(Vector2::new(3, 5)).unwrap();
        assert_eq!(block.tensor().shape(), [5, 3, 1]);
        assert_eq!(block.generation(), 1);
    }

    #[test]
    fn warn_flags_toggle() {
        let mut block = ImageBlock::new(
            Point2::origin(),
            Vector2::new(2, 2),
            1,
            None,
            BlockConfig::default(),
        )
        .unwrap();
        block.set_warn_invalid(false);
        block.set_warn_negative(false);
        assert!(!block.warn_invalid());
        assert!(!block.warn_negative());
    }
}
