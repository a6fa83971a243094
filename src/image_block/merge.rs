// src/image_block/merge.rs

use super::ImageBlock;
use crate::error::{BlockError, BlockResult};
use rayon::prelude::*;
use std::ops::Range;

/// Overlap of one axis, expressed in target storage coordinates.
fn overlap(origin: i64, source_len: usize, target_len: usize) -> Range<i64> {
    origin.max(0)..(origin + source_len as i64).min(target_len as i64)
}

impl ImageBlock {
    /// Add the whole of `other`, border included, into this block.
    ///
    /// Both blocks are placed by their offsets, so border pixels of `other`
    /// land on the neighbouring pixels of this block and are summed with
    /// what is already there. The part of `other` outside this block's
    /// storage is ignored.
    pub fn put_block(&self, other: &ImageBlock) -> BlockResult<()> {
        if other.channel_count != self.channel_count {
            return Err(BlockError::channel_mismatch(
                self.channel_count,
                other.channel_count,
            ));
        }
        if self.storage.has_weights() && !other.storage.has_weights() {
            return Err(BlockError::WeightPlaneMismatch);
        }

        // Top-left corner of other's storage inside ours.
        let origin_x = (other.offset.x as i64 - other.border_size as i64)
            - (self.offset.x as i64 - self.border_size as i64);
        let origin_y = (other.offset.y as i64 - other.border_size as i64)
            - (self.offset.y as i64 - self.border_size as i64);

        let [source_h, source_w, channels] = other.storage.shape();
        let [target_h, target_w, _] = self.storage.shape();
        let cols = overlap(origin_x, source_w, target_w);
        let rows = overlap(origin_y, source_h, target_h);
        if cols.is_empty() || rows.is_empty() {
            return Err(BlockError::NoOverlap {
                source_origin: [origin_x, origin_y],
                source_extent: [source_w, source_h],
                target_extent: [target_w, target_h],
            });
        }

        let source = other.storage.cells();
        let target = self.storage.cells();
        let weights = self.storage.weight_cells().zip(other.storage.weight_cells());
        let run = (cols.end - cols.start) as usize;

        let merge_row = |row: i64| {
            let src_row = (row - origin_y) as usize;
            let dst_row = row as usize;
            let src_pixel = src_row * source_w + (cols.start - origin_x) as usize;
            let dst_pixel = dst_row * target_w + cols.start as usize;

            let src = &source[src_pixel * channels..(src_pixel + run) * channels];
            let dst = &target[dst_pixel * channels..(dst_pixel + run) * channels];
            for (d, s) in dst.iter().zip(src) {
                self.policy.add(d, s.load());
            }

            if let Some((dst_weights, src_weights)) = weights {
                let src = &src_weights[src_pixel..src_pixel + run];
                let dst = &dst_weights[dst_pixel..dst_pixel + run];
                for (d, s) in dst.iter().zip(src) {
                    self.policy.add(d, s.load());
                }
            }
        };

        if self.policy.is_atomic() {
            rows.clone().into_par_iter().for_each(merge_row);
        } else {
            rows.clone().for_each(merge_row);
        }

        log::debug!(
            "merged {}x{} block at {:?} into block at {:?} ({} rows, {} cols)",
            other.size.x,
            other.size.y,
            other.offset,
            self.offset,
            rows.end - rows.start,
            run
        );
        Ok(())
    }
}
