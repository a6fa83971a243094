// src/image_block/read.rs

use super::ImageBlock;
use crate::error::BlockResult;
use nalgebra::Point2;

/// Cell index along one axis. Non-finite coordinates never land in storage.
fn cell_index(v: f32) -> i64 {
    if v.is_finite() {
        v.floor() as i64
    } else {
        i64::MIN
    }
}

impl ImageBlock {
    /// Values of the storage cell containing `pos`, without filtering.
    ///
    /// Normalizing blocks divide by the cell's accumulated weight (zero
    /// weight reads as zero). Inactive reads return zeros and do not touch
    /// storage.
    pub fn read(&self, pos: Point2<f32>, active: bool) -> BlockResult<Vec<f32>> {
        if !active {
            return Ok(vec![0.0; self.channel_count]);
        }
        let p = self.storage_position(pos);
        self.storage
            .read(cell_index(p.y), cell_index(p.x), self.config.normalize)
    }

    /// Filter-weighted reconstruction at `pos`: a weighted average of the
    /// footprint cells that fall inside storage. Returns zeros when no
    /// footprint cell does.
    pub fn read_filtered(&self, pos: Point2<f32>, active: bool) -> BlockResult<Vec<f32>> {
        let mut out = vec![0.0; self.channel_count];
        if !active || !pos.x.is_finite() || !pos.y.is_finite() {
            return Ok(out);
        }

        let footprint = self.adapter.footprint(self.storage_position(pos));
        let mut cell = vec![0.0; self.channel_count];
        let mut weight_sum = 0.0;
        for fc in footprint.iter() {
            if fc.weight == 0.0 || !self.storage.contains(fc.row, fc.col) {
                continue;
            }
            self.storage
                .read_into(fc.row, fc.col, self.config.normalize, &mut cell)?;
            for (acc, v) in out.iter_mut().zip(&cell) {
                *acc += v * fc.weight;
            }
            weight_sum += fc.weight;
        }

        let scale = if weight_sum != 0.0 { 1.0 / weight_sum } else { 0.0 };
        out.iter_mut().for_each(|v| *v *= scale);
        Ok(out)
    }
}
