// tests/test_image_block.rs: put/read/clear behaviour through the public API.

use approx::assert_relative_eq;
use nalgebra::{Point2, Vector2};
use radiance_block::{
    BlockConfig, BlockError, GaussianFilter, ImageBlock, ReconstructionFilter, Tensor, TentFilter,
};
use std::sync::Arc;

fn plain_block(channels: usize) -> ImageBlock {
    ImageBlock::new(
        Point2::origin(),
        Vector2::new(4, 4),
        channels,
        None,
        BlockConfig::default().with_border(false),
    )
    .unwrap()
}

fn filtered_block(filter: Arc<dyn ReconstructionFilter>) -> ImageBlock {
    ImageBlock::new(
        Point2::new(16, 8),
        Vector2::new(8, 8),
        1,
        Some(filter),
        BlockConfig::default(),
    )
    .unwrap()
}

fn total(block: &ImageBlock) -> f32 {
    block.tensor().to_vec().iter().sum()
}

// ===== Put / read / clear =====

#[test]
fn put_read_clear_scenario() {
    let mut block = plain_block(5);
    block
        .put(Point2::new(2.0, 2.0), &[1.0, 1.0, 1.0, 1.0, 1.0], true)
        .unwrap();
    assert_eq!(
        block.read(Point2::new(2.0, 2.0), true).unwrap(),
        vec![1.0; 5]
    );

    block.clear();
    assert_eq!(
        block.read(Point2::new(2.0, 2.0), true).unwrap(),
        vec![0.0; 5]
    );
}

#[test]
fn clear_zeroes_every_cell() {
    let mut block = filtered_block(Arc::new(GaussianFilter::new(0.5)));
    for i in 0..20 {
        let pos = Point2::new(16.0 + (i % 8) as f32 + 0.3, 8.0 + (i / 3) as f32 + 0.7);
        block.put(pos, &[1.0 + i as f32], true).unwrap();
    }
    assert!(total(&block) > 0.0);

    let offset = block.offset();
    block.clear();
    assert_eq!(block.offset(), offset);
    let extent = block.tensor().shape();
    let border = block.border_size() as f32;
    for row in 0..extent[0] {
        for col in 0..extent[1] {
            let pos = Point2::new(
                16.0 - border + col as f32 + 0.5,
                8.0 - border + row as f32 + 0.5,
            );
            assert_eq!(block.read(pos, true).unwrap(), vec![0.0]);
        }
    }
}

#[test]
fn box_filter_put_then_read_at_pixel_centre() {
    let block = plain_block(3);
    block.put(Point2::new(1.5, 2.5), &[0.25, 0.5, 0.75], true).unwrap();
    block.put(Point2::new(1.5, 2.5), &[0.25, 0.5, 0.75], true).unwrap();
    assert_eq!(
        block.read(Point2::new(1.5, 2.5), true).unwrap(),
        vec![0.5, 1.0, 1.5]
    );
}

#[test]
fn filtered_put_spreads_energy_away_from_centre() {
    let filter: Arc<dyn ReconstructionFilter> = Arc::new(GaussianFilter::new(0.5));
    let block = filtered_block(filter.clone());
    let pos = Point2::new(20.5, 12.5);
    block.put(pos, &[1.0], true).unwrap();

    let centre = block.read(pos, true).unwrap()[0];
    assert_relative_eq!(centre, filter.eval(0.0) * filter.eval(0.0), epsilon = 1e-6);
    assert!(centre < total(&block));
}

// ===== Energy conservation =====

#[test]
fn footprint_energy_is_conserved_inside_extent() {
    let filter: Arc<dyn ReconstructionFilter> = Arc::new(GaussianFilter::new(0.5));
    let block = filtered_block(filter.clone());
    let pos = Point2::new(19.3, 11.8);
    let weight = 3.0;
    block.put(pos, &[weight], true).unwrap();

    let adapter = radiance_block::filter::FilterAdapter::new(Some(filter));
    let border = block.border_size() as f32;
    let local = Point2::new(pos.x - 16.0 + border, pos.y - 8.0 + border);
    let expected = adapter.footprint(local).total_weight() * weight;
    assert_relative_eq!(total(&block), expected, epsilon = 1e-4);
}

#[test]
fn border_catches_footprint_past_block_edge() {
    let tent: Arc<dyn ReconstructionFilter> = Arc::new(TentFilter::new(1.5));
    let block = filtered_block(tent.clone());
    assert_eq!(block.border_size(), 1);

    // Sample on the block's top-left pixel centre: the neighbours at
    // distance one fall into the border, nothing is lost.
    block.put(Point2::new(16.5, 8.5), &[1.0], true).unwrap();
    let one_d: f32 = [-1.0f32, 0.0, 1.0].iter().map(|x| tent.eval(*x)).sum();
    assert_relative_eq!(total(&block), one_d * one_d, epsilon = 1e-5);
    assert!(block.tensor().get(0, 0, 0).unwrap() > 0.0);
}

// ===== No-ops =====

#[test]
fn put_outside_extent_is_silent_noop() {
    let block = filtered_block(Arc::new(GaussianFilter::new(0.5)));
    block.put(Point2::new(-100.0, 4.0), &[1.0], true).unwrap();
    block.put(Point2::new(16.0, 1000.0), &[1.0], true).unwrap();
    assert_eq!(total(&block), 0.0);
}

#[test]
fn inactive_put_never_touches_storage() {
    let block = plain_block(2);
    block.put(Point2::new(1.0, 1.0), &[5.0, 5.0], false).unwrap();
    block
        .put(Point2::new(1.0, 1.0), &[f32::NAN, f32::INFINITY], false)
        .unwrap();
    block
        .put_sample(Point2::new(1.0, 1.0), &[], 1.0, 1.0, false)
        .unwrap();
    assert_eq!(total(&block), 0.0);
    assert_eq!(block.diagnostics().invalid, 0);
}

#[test]
fn inactive_read_returns_zeros() {
    let block = plain_block(2);
    block.put(Point2::new(1.0, 1.0), &[5.0, 5.0], true).unwrap();
    assert_eq!(block.read(Point2::new(1.0, 1.0), false).unwrap(), vec![0.0, 0.0]);
}

// ===== Errors =====

#[test]
fn channel_mismatch_leaves_storage_unmodified() {
    let block = plain_block(4);
    let err = block
        .put(Point2::new(1.0, 1.0), &[1.0, 1.0, 1.0], true)
        .unwrap_err();
    assert_eq!(err, BlockError::ChannelMismatch { expected: 4, got: 3 });
    assert_eq!(total(&block), 0.0);
}

#[test]
fn snapshot_round_trip_and_staleness() {
    let mut block = plain_block(1);
    block.put(Point2::new(0.5, 0.5), &[2.0], true).unwrap();
    let snapshot = block.snapshot();

    block.clear();
    block.restore(&snapshot).unwrap();
    assert_eq!(block.read(Point2::new(0.5, 0.5), true).unwrap(), vec![2.0]);

    block.set_size(Vector2::new(4, 4)).unwrap();
    assert!(matches!(
        block.restore(&snapshot),
        Err(BlockError::StaleGeneration { .. })
    ));
}

#[test]
fn tensor_write_past_row_end_fails_without_touching_neighbours() {
    let mut block = ImageBlock::new(
        Point2::origin(),
        Vector2::new(2, 2),
        1,
        None,
        BlockConfig::default(),
    )
    .unwrap();
    let width = block.tensor().shape()[1];
    assert!(matches!(
        block.tensor_mut().set(0, width, 0, 9.0),
        Err(BlockError::OutOfBounds { .. })
    ));
    assert_eq!(block.tensor().get(1, 0, 0).unwrap(), 0.0);
    assert_eq!(block.read(Point2::new(0.5, 1.5), true).unwrap(), vec![0.0]);
}

#[test]
fn overflowing_tensor_shape_is_rejected() {
    assert!(matches!(
        Tensor::new([1 << 63, 2, 1], Vec::new()),
        Err(BlockError::Allocation { .. })
    ));
}

#[test]
fn non_finite_values_reach_storage_when_unchecked() {
    let block = ImageBlock::new(
        Point2::origin(),
        Vector2::new(2, 2),
        1,
        None,
        BlockConfig::default().with_warnings(true, false),
    )
    .unwrap();
    block.put(Point2::new(1.5, 0.5), &[f32::NAN], true).unwrap();
    assert!(block.read(Point2::new(1.5, 0.5), true).unwrap()[0].is_nan());
}

// ===== Reuse across tiles =====

#[test]
fn set_offset_relocates_without_reallocating() {
    let mut block = plain_block(1);
    let generation = block.generation();
    block.set_offset(Point2::new(100, 200));
    block.put(Point2::new(101.5, 200.5), &[1.0], true).unwrap();
    assert_eq!(block.tensor().get(0, 1, 0).unwrap(), 1.0);
    assert_eq!(block.generation(), generation);
}

#[test]
fn adopted_tensor_is_readable() {
    let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let tensor = Tensor::new([2, 3, 2], data).unwrap();
    let block = ImageBlock::from_tensor(
        Point2::new(10, 10),
        tensor,
        None,
        BlockConfig::default().with_normalize(true),
    )
    .unwrap();
    assert_eq!(block.size(), Vector2::new(3, 2));
    assert_eq!(
        block.read(Point2::new(12.5, 11.5), true).unwrap(),
        vec![10.0, 11.0]
    );
}
