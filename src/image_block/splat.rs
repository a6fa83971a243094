// src/image_block/splat.rs

use super::ImageBlock;
use crate::error::{BlockError, BlockResult};
use crate::spectrum::{Passthrough, SpectralResponse};
use nalgebra::Point2;
use rayon::prelude::*;

/// One pre-built sample for [`ImageBlock::put_batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub pos: Point2<f32>,
    pub values: Vec<f32>,
    pub active: bool,
}

impl Sample {
    pub fn new(pos: Point2<f32>, values: Vec<f32>) -> Self {
        Self {
            pos,
            values,
            active: true,
        }
    }
}

impl ImageBlock {
    /// Splat a spectral sample. The response fills the colour channels and
    /// `alpha` and `weight` are appended as the two trailing channels.
    #[allow(clippy::too_many_arguments)]
    pub fn put_spectral<R: SpectralResponse + ?Sized>(
        &self,
        pos: Point2<f32>,
        wavelengths: &[f32],
        value: &[f32],
        alpha: f32,
        weight: f32,
        response: &R,
        active: bool,
    ) -> BlockResult<()> {
        let colors = response.channel_count();
        if colors + 2 != self.channel_count {
            return Err(BlockError::channel_mismatch(self.channel_count, colors + 2));
        }
        if !active {
            return Ok(());
        }

        let mut values = vec![0.0; self.channel_count];
        response.to_channels(wavelengths, value, &mut values[..colors]);
        values[colors] = alpha;
        values[colors + 1] = weight;
        self.splat(pos, &values)?;
        Ok(())
    }

    /// Splat a sample whose value is already in the block's colour space.
    pub fn put_sample(
        &self,
        pos: Point2<f32>,
        value: &[f32],
        alpha: f32,
        weight: f32,
        active: bool,
    ) -> BlockResult<()> {
        if value.len() + 2 != self.channel_count {
            return Err(BlockError::channel_mismatch(self.channel_count, value.len() + 2));
        }
        let response = Passthrough::new(value.len());
        self.put_spectral(pos, &[], value, alpha, weight, &response, active)
    }

    /// [`put_sample`](Self::put_sample) with unit alpha and weight.
    pub fn put_value(&self, pos: Point2<f32>, value: &[f32], active: bool) -> BlockResult<()> {
        self.put_sample(pos, value, 1.0, 1.0, active)
    }

    /// Splat a raw channel vector. Storage is untouched on error.
    pub fn put(&self, pos: Point2<f32>, values: &[f32], active: bool) -> BlockResult<()> {
        if values.len() != self.channel_count {
            return Err(BlockError::channel_mismatch(self.channel_count, values.len()));
        }
        if active {
            self.splat(pos, values)?;
        }
        Ok(())
    }

    /// Splat many samples. Runs on the rayon pool when the block coalesces.
    ///
    /// Every sample is validated before any is written. Returns how many
    /// samples reached storage.
    pub fn put_batch(&self, samples: &[Sample]) -> BlockResult<usize> {
        if let Some(bad) = samples.iter().find(|s| s.values.len() != self.channel_count) {
            return Err(BlockError::channel_mismatch(self.channel_count, bad.values.len()));
        }

        let write = |sample: &Sample| -> BlockResult<usize> {
            Ok(usize::from(
                sample.active && self.splat(sample.pos, &sample.values)?,
            ))
        };
        if self.policy.is_atomic() {
            samples
                .par_iter()
                .map(write)
                .try_reduce(|| 0, |a, b| Ok(a + b))
        } else {
            samples.iter().map(write).sum()
        }
    }

    /// Scatter `values` over the filter footprint of `pos`. Cells outside
    /// the border-inclusive extent are skipped. Returns whether anything was
    /// written.
    fn splat(&self, pos: Point2<f32>, values: &[f32]) -> BlockResult<bool> {
        if !pos.x.is_finite() || !pos.y.is_finite() {
            if self.config.warn_invalid {
                self.diagnostics.report_invalid(pos);
            }
            return Ok(false);
        }
        if self.config.warn_invalid && values.iter().any(|v| !v.is_finite()) {
            self.diagnostics.report_invalid(pos);
            return Ok(false);
        }

        let footprint = self.adapter.footprint(self.storage_position(pos));
        let mut written = false;
        let mut negative = false;
        for cell in footprint.iter() {
            if !self.storage.contains(cell.row, cell.col) {
                continue;
            }
            negative |= self
                .storage
                .accumulate(cell.row, cell.col, values, cell.weight, self.policy)?;
            written = true;
        }

        if negative && self.config.warn_negative {
            self.diagnostics.report_negative(pos);
        }
        Ok(written)
    }
}
