// src/main.rs
use nalgebra::{Point2, Vector2};
use radiance_block::{
    frame, Backend, BlockConfig, BlockResult, GaussianFilter, ImageBlock, ReconstructionFilter,
};
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::error::Error;
use std::sync::Arc;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const TILE: u32 = 32;
const SPP: u32 = 16;
// RGB + alpha + weight
const CHANNELS: usize = 5;

/// Analytic test scene: a warm gradient with a bright disc and a thin ring,
/// sharp enough to show the reconstruction filter at work.
fn radiance(p: Point2<f32>) -> [f32; 3] {
    let u = p.x / WIDTH as f32;
    let v = p.y / HEIGHT as f32;
    let d = (p - Point2::new(WIDTH as f32 * 0.5, HEIGHT as f32 * 0.5)).norm();

    if d < 60.0 {
        [1.0, 0.9, 0.6]
    } else if (d - 80.0).abs() < 1.5 {
        [0.1, 0.6, 1.0]
    } else {
        [0.2 + 0.6 * u, 0.15 + 0.3 * v, 0.25]
    }
}

fn render_tile(
    offset: Point2<i32>,
    size: Vector2<u32>,
    filter: &Arc<dyn ReconstructionFilter>,
) -> BlockResult<ImageBlock> {
    let block = ImageBlock::new(
        offset,
        size,
        CHANNELS,
        Some(filter.clone()),
        BlockConfig::for_backend(Backend::Scalar),
    )?;
    let seed = ((offset.y as u64) << 32) | offset.x as u64;
    let mut rng = StdRng::seed_from_u64(seed);

    for y in 0..size.y {
        for x in 0..size.x {
            for _ in 0..SPP {
                let pos = Point2::new(
                    (offset.x + x as i32) as f32 + rng.gen::<f32>(),
                    (offset.y + y as i32) as f32 + rng.gen::<f32>(),
                );
                block.put_value(pos, &radiance(pos), true)?;
            }
        }
    }
    Ok(block)
}

fn main() -> Result<(), Box<dyn Error>> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();

    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "radiance_block.png".to_string());
    let filter: Arc<dyn ReconstructionFilter> = Arc::new(GaussianFilter::new(0.5));

    let offsets: Vec<Point2<i32>> = (0..HEIGHT)
        .step_by(TILE as usize)
        .flat_map(|y| (0..WIDTH).step_by(TILE as usize).map(move |x| Point2::new(x as i32, y as i32)))
        .collect();
    log::info!(
        "Rendering {}x{} at {} spp in {} tiles",
        WIDTH,
        HEIGHT,
        SPP,
        offsets.len()
    );

    let tiles = offsets
        .par_iter()
        .map(|offset| {
            let size = Vector2::new(
                TILE.min(WIDTH - offset.x as u32),
                TILE.min(HEIGHT - offset.y as u32),
            );
            render_tile(*offset, size, &filter)
        })
        .collect::<BlockResult<Vec<_>>>()?;

    // Tiles land in the shared frame from every worker at once.
    let frame_block = ImageBlock::new(
        Point2::origin(),
        Vector2::new(WIDTH, HEIGHT),
        CHANNELS,
        Some(filter.clone()),
        BlockConfig::for_backend(Backend::Vectorized).with_border(true),
    )?;
    tiles.par_iter().try_for_each(|tile| frame_block.put_block(tile))?;

    let reference = ImageBlock::new(
        Point2::origin(),
        Vector2::new(WIDTH, HEIGHT),
        CHANNELS,
        Some(filter),
        BlockConfig::for_backend(Backend::Scalar),
    )?;
    for tile in &tiles {
        reference.put_block(tile)?;
    }

    let image = frame::to_rgb32f(&frame_block)?;
    let reference_image = frame::to_rgb32f(&reference)?;
    log::info!(
        "Parallel merge vs sequential merge: PSNR {:.1} dB",
        frame::psnr(&reference_image, &image)
    );

    let counts = tiles
        .iter()
        .map(ImageBlock::diagnostics)
        .fold((0, 0), |acc, d| (acc.0 + d.negative, acc.1 + d.invalid));
    if counts != (0, 0) {
        log::warn!(
            "{} negative and {} invalid samples during rendering",
            counts.0,
            counts.1
        );
    }

    frame::to_rgb8(&image).save(&output)?;
    log::info!("Wrote {}", output);
    Ok(())
}
