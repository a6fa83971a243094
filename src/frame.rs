// src/frame.rs
//! Hand-off from an accumulated block to an `image` buffer.
//!
//! No colour management happens here: the first three channels are copied
//! out as-is, divided by the accumulated weight when one is available.

use crate::error::{BlockError, BlockResult};
use crate::ImageBlock;
use image::{ImageBuffer, Rgb, Rgb32FImage, RgbImage};
use rayon::prelude::*;

/// Copy the interior of an RGB block into a float image.
///
/// Normalizing blocks are divided by their weight plane. Otherwise, blocks
/// with at least five channels are taken to carry `[r, g, b, .., weight]`
/// and are divided by the trailing weight channel. Pixels with zero weight
/// come out black.
pub fn to_rgb32f(block: &ImageBlock) -> BlockResult<Rgb32FImage> {
    let channels = block.channel_count();
    if channels < 3 {
        return Err(BlockError::channel_mismatch(3, channels));
    }
    let width = block.width() as usize;
    let height = block.height() as usize;
    let border = block.border_size() as i64;
    let storage = block.storage();
    let weight_channel = (!block.normalize() && channels >= 5).then_some(channels - 1);

    let mut buffer = vec![0.0f32; width * height * 3];
    buffer
        .par_chunks_mut(width * 3)
        .enumerate()
        .try_for_each(|(y, row)| -> BlockResult<()> {
            let mut values = vec![0.0; channels];
            for (x, pixel) in row.chunks_mut(3).enumerate() {
                storage.read_into(
                    y as i64 + border,
                    x as i64 + border,
                    block.normalize(),
                    &mut values,
                )?;
                let scale = match weight_channel {
                    Some(w) if values[w] != 0.0 => 1.0 / values[w],
                    Some(_) => 0.0,
                    None => 1.0,
                };
                for (dst, src) in pixel.iter_mut().zip(&values[..3]) {
                    *dst = src * scale;
                }
            }
            Ok(())
        })?;

    ImageBuffer::from_raw(width as u32, height as u32, buffer).ok_or(BlockError::ShapeMismatch {
        expected: [height, width, 3],
        got: [0, 0, 0],
    })
}

/// Clamp a float image to `[0, 1]` and quantize to 8 bits.
pub fn to_rgb8(image: &Rgb32FImage) -> RgbImage {
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        Rgb([
            (p[0].clamp(0.0, 1.0) * 255.0) as u8,
            (p[1].clamp(0.0, 1.0) * 255.0) as u8,
            (p[2].clamp(0.0, 1.0) * 255.0) as u8,
        ])
    })
}

/// Peak signal-to-noise ratio between two float images with peak 1.0.
/// Identical images give infinity.
pub fn psnr(reference: &Rgb32FImage, test: &Rgb32FImage) -> f32 {
    let count = reference.as_raw().len().min(test.as_raw().len());
    if count == 0 {
        return 0.0;
    }
    let mse = reference
        .as_raw()
        .iter()
        .zip(test.as_raw())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f32>()
        / count as f32;

    if mse == 0.0 {
        return f32::INFINITY;
    }
    -10.0 * mse.log10()
}
