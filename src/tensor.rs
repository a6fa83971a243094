// src/tensor.rs
//! Height x width x channel storage behind an [`ImageBlock`](crate::ImageBlock).
//!
//! Cells are `f32` values kept in atomics so that both accumulation
//! policies can write through a shared reference. Layout is row-major with
//! channels innermost.

use crate::error::{BlockError, BlockResult};
use crate::policy::AccumulatePolicy;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` that can be updated through `&self`.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Atomically add `value`, returning the previous value.
    pub fn fetch_add(&self, value: f32) -> f32 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + value).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(previous) => return f32::from_bits(previous),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Owned dense tensor of shape `[height, width, channels]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: [usize; 3], data: Vec<f32>) -> BlockResult<Self> {
        let expected = element_count(shape).ok_or_else(|| allocation_error(shape))?;
        if data.len() != expected {
            return Err(BlockError::ShapeMismatch {
                expected: shape,
                got: [data.len(), 1, 1],
            });
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: [usize; 3]) -> BlockResult<Self> {
        let len = element_count(shape).ok_or_else(|| allocation_error(shape))?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| allocation_error(shape))?;
        data.resize(len, 0.0);
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn height(&self) -> usize {
        self.shape[0]
    }

    pub fn width(&self) -> usize {
        self.shape[1]
    }

    pub fn channels(&self) -> usize {
        self.shape[2]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn get(&self, row: usize, col: usize, channel: usize) -> BlockResult<f32> {
        Ok(self.data[element_index(self.shape, row, col, channel)?])
    }

    pub fn pixel(&self, row: usize, col: usize) -> BlockResult<&[f32]> {
        let start = pixel_start(self.shape, row, col)?;
        Ok(&self.data[start..start + self.shape[2]])
    }
}

/// Detached copy of a storage's contents, stamped with the storage
/// generation it was taken from.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSnapshot {
    pub tensor: Tensor,
    pub weights: Option<Vec<f32>>,
    generation: u64,
}

impl TensorSnapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn allocation_error([height, width, channels]: [usize; 3]) -> BlockError {
    BlockError::Allocation {
        height,
        width,
        channels,
    }
}

fn element_count(shape: [usize; 3]) -> Option<usize> {
    shape[0].checked_mul(shape[1])?.checked_mul(shape[2])
}

/// Flat offset of the first channel of `(row, col)` in a row-major
/// `[height, width, channels]` layout.
fn pixel_start(shape: [usize; 3], row: usize, col: usize) -> BlockResult<usize> {
    if row >= shape[0] || col >= shape[1] {
        return Err(BlockError::out_of_bounds(
            i64::try_from(row).unwrap_or(i64::MAX),
            i64::try_from(col).unwrap_or(i64::MAX),
            shape[0],
            shape[1],
        ));
    }
    Ok((row * shape[1] + col) * shape[2])
}

fn element_index(shape: [usize; 3], row: usize, col: usize, channel: usize) -> BlockResult<usize> {
    if channel >= shape[2] {
        return Err(BlockError::ChannelOutOfRange {
            channel,
            channels: shape[2],
        });
    }
    Ok(pixel_start(shape, row, col)? + channel)
}

fn allocate(len: usize, fill: f32) -> Option<Vec<AtomicF32>> {
    let mut cells = Vec::new();
    cells.try_reserve_exact(len).ok()?;
    cells.resize_with(len, || AtomicF32::new(fill));
    Some(cells)
}

fn load_all(cells: &[AtomicF32]) -> Vec<f32> {
    cells.iter().map(AtomicF32::load).collect()
}

/// Accumulation storage with an optional per-pixel weight-sum plane.
#[derive(Debug)]
pub struct TensorStorage {
    cells: Vec<AtomicF32>,
    weights: Option<Vec<AtomicF32>>,
    shape: [usize; 3],
    generation: u64,
}

impl TensorStorage {
    pub fn new(height: usize, width: usize, channels: usize, with_weights: bool) -> BlockResult<Self> {
        let mut storage = Self {
            cells: Vec::new(),
            weights: with_weights.then(Vec::new),
            shape: [0, 0, 0],
            generation: 0,
        };
        storage.allocate(height, width, channels)?;
        Ok(storage)
    }

    /// Adopt `tensor` as storage. A weight plane, when requested, starts at
    /// one per pixel: the adopted values are treated as resolved pixels.
    pub fn from_tensor(tensor: Tensor, with_weights: bool) -> BlockResult<Self> {
        let [height, width, channels] = tensor.shape();
        if height == 0 || width == 0 || channels == 0 {
            return Err(BlockError::Allocation {
                height,
                width,
                channels,
            });
        }
        let weights = if with_weights {
            Some(allocate(height * width, 1.0).ok_or(BlockError::Allocation {
                height,
                width,
                channels: 1,
            })?)
        } else {
            None
        };
        Ok(Self {
            cells: tensor.into_data().into_iter().map(AtomicF32::new).collect(),
            weights,
            shape: [height, width, channels],
            generation: 0,
        })
    }

    /// Reallocate for a new shape. Prior contents are discarded.
    pub fn resize(&mut self, height: usize, width: usize, channels: usize) -> BlockResult<()> {
        self.allocate(height, width, channels)?;
        self.generation += 1;
        log::debug!(
            "storage resized to {}x{}x{} (generation {})",
            height,
            width,
            channels,
            self.generation
        );
        Ok(())
    }

    fn allocate(&mut self, height: usize, width: usize, channels: usize) -> BlockResult<()> {
        let error = BlockError::Allocation {
            height,
            width,
            channels,
        };
        if height == 0 || width == 0 || channels == 0 {
            return Err(error);
        }
        let pixels = height.checked_mul(width).ok_or(error.clone())?;
        let len = pixels.checked_mul(channels).ok_or(error.clone())?;

        let cells = allocate(len, 0.0).ok_or(error.clone())?;
        let weights = match self.weights {
            Some(_) => Some(allocate(pixels, 0.0).ok_or(error)?),
            None => None,
        };
        self.cells = cells;
        self.weights = weights;
        self.shape = [height, width, channels];
        Ok(())
    }

    pub fn clear(&mut self) {
        self.cells.par_iter_mut().for_each(|cell| cell.store(0.0));
        if let Some(weights) = self.weights.as_mut() {
            weights.par_iter_mut().for_each(|cell| cell.store(0.0));
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn height(&self) -> usize {
        self.shape[0]
    }

    pub fn width(&self) -> usize {
        self.shape[1]
    }

    pub fn channels(&self) -> usize {
        self.shape[2]
    }

    pub fn has_weights(&self) -> bool {
        self.weights.is_some()
    }

    /// Bumped on every reallocation or replacement of the storage.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn contains(&self, row: i64, col: i64) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.shape[0] && (col as usize) < self.shape[1]
    }

    fn pixel_index(&self, row: i64, col: i64) -> BlockResult<usize> {
        if !self.contains(row, col) {
            return Err(BlockError::out_of_bounds(
                row,
                col,
                self.shape[0],
                self.shape[1],
            ));
        }
        Ok(row as usize * self.shape[1] + col as usize)
    }

    /// Add `values[i] * weight` to each channel of `(row, col)` and `weight`
    /// to the weight plane. Returns whether any channel ended up negative.
    pub fn accumulate(
        &self,
        row: i64,
        col: i64,
        values: &[f32],
        weight: f32,
        policy: &dyn AccumulatePolicy,
    ) -> BlockResult<bool> {
        if values.len() != self.shape[2] {
            return Err(BlockError::channel_mismatch(self.shape[2], values.len()));
        }
        let pixel = self.pixel_index(row, col)?;
        let start = pixel * self.shape[2];

        let mut negative = false;
        for (cell, value) in self.cells[start..start + values.len()].iter().zip(values) {
            negative |= policy.add(cell, value * weight) < 0.0;
        }
        if let Some(weights) = self.weights.as_ref() {
            policy.add(&weights[pixel], weight);
        }
        Ok(negative)
    }

    /// Values at `(row, col)`, divided by the accumulated weight when
    /// `normalize` is set and a weight plane exists. Zero weight reads as zero.
    pub fn read(&self, row: i64, col: i64, normalize: bool) -> BlockResult<Vec<f32>> {
        let mut out = vec![0.0; self.shape[2]];
        self.read_into(row, col, normalize, &mut out)?;
        Ok(out)
    }

    pub fn read_into(&self, row: i64, col: i64, normalize: bool, out: &mut [f32]) -> BlockResult<()> {
        if out.len() != self.shape[2] {
            return Err(BlockError::channel_mismatch(self.shape[2], out.len()));
        }
        let pixel = self.pixel_index(row, col)?;
        let start = pixel * self.shape[2];
        for (dst, cell) in out.iter_mut().zip(&self.cells[start..start + self.shape[2]]) {
            *dst = cell.load();
        }

        if let (true, Some(weights)) = (normalize, self.weights.as_ref()) {
            let weight = weights[pixel].load();
            let scale = if weight != 0.0 { 1.0 / weight } else { 0.0 };
            out.iter_mut().for_each(|v| *v *= scale);
        }
        Ok(())
    }

    /// Accumulated filter weight at `(row, col)`, if a weight plane is kept.
    pub fn weight(&self, row: i64, col: i64) -> BlockResult<Option<f32>> {
        let pixel = self.pixel_index(row, col)?;
        Ok(self.weights.as_ref().map(|w| w[pixel].load()))
    }

    pub(crate) fn cells(&self) -> &[AtomicF32] {
        &self.cells
    }

    pub(crate) fn weight_cells(&self) -> Option<&[AtomicF32]> {
        self.weights.as_deref()
    }

    /// Borrow the backing array without copying.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            cells: &self.cells,
            shape: self.shape,
            generation: self.generation,
        }
    }

    /// Borrow the weight plane as a single-channel view.
    pub fn weight_view(&self) -> Option<TensorView<'_>> {
        self.weights.as_ref().map(|weights| TensorView {
            cells: weights,
            shape: [self.shape[0], self.shape[1], 1],
            generation: self.generation,
        })
    }

    pub fn view_mut(&mut self) -> TensorViewMut<'_> {
        TensorViewMut {
            cells: &mut self.cells,
            shape: self.shape,
            generation: self.generation,
        }
    }

    pub fn snapshot(&self) -> TensorSnapshot {
        TensorSnapshot {
            tensor: Tensor {
                shape: self.shape,
                data: load_all(&self.cells),
            },
            weights: self.weights.as_deref().map(load_all),
            generation: self.generation,
        }
    }

    /// Write a snapshot back. Fails if the storage was reallocated since the
    /// snapshot was taken.
    pub fn restore(&mut self, snapshot: &TensorSnapshot) -> BlockResult<()> {
        if snapshot.generation != self.generation {
            return Err(BlockError::StaleGeneration {
                snapshot: snapshot.generation,
                current: self.generation,
            });
        }
        if snapshot.tensor.shape() != self.shape {
            return Err(BlockError::ShapeMismatch {
                expected: self.shape,
                got: snapshot.tensor.shape(),
            });
        }
        for (cell, value) in self.cells.iter().zip(snapshot.tensor.data()) {
            cell.store(*value);
        }
        match (self.weights.as_ref(), snapshot.weights.as_ref()) {
            (Some(weights), Some(saved)) => {
                for (cell, value) in weights.iter().zip(saved) {
                    cell.store(*value);
                }
            }
            (None, None) => {}
            _ => return Err(BlockError::WeightPlaneMismatch),
        }
        Ok(())
    }
}

/// Borrowed, read-only view over storage cells.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    cells: &'a [AtomicF32],
    shape: [usize; 3],
    generation: u64,
}

impl<'a> TensorView<'a> {
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, row: usize, col: usize, channel: usize) -> BlockResult<f32> {
        Ok(self.cells[element_index(self.shape, row, col, channel)?].load())
    }

    pub fn pixel(&self, row: usize, col: usize) -> BlockResult<Vec<f32>> {
        let start = pixel_start(self.shape, row, col)?;
        Ok(load_all(&self.cells[start..start + self.shape[2]]))
    }

    pub fn to_vec(&self) -> Vec<f32> {
        load_all(self.cells)
    }

    pub fn to_tensor(&self) -> Tensor {
        Tensor {
            shape: self.shape,
            data: self.to_vec(),
        }
    }
}

/// Borrowed, writable view over storage cells.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    cells: &'a mut [AtomicF32],
    shape: [usize; 3],
    generation: u64,
}

impl<'a> TensorViewMut<'a> {
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, row: usize, col: usize, channel: usize) -> BlockResult<f32> {
        Ok(self.cells[element_index(self.shape, row, col, channel)?].load())
    }

    /// Overwrite one cell. Coordinates outside the shape leave every cell
    /// untouched.
    pub fn set(&mut self, row: usize, col: usize, channel: usize, value: f32) -> BlockResult<()> {
        self.cells[element_index(self.shape, row, col, channel)?].store(value);
        Ok(())
    }

    pub fn fill(&mut self, value: f32) {
        self.cells.par_iter_mut().for_each(|cell| cell.store(value));
    }

    pub fn copy_from(&mut self, tensor: &Tensor) -> BlockResult<()> {
        if tensor.shape() != self.shape {
            return Err(BlockError::ShapeMismatch {
                expected: self.shape,
                got: tensor.shape(),
            });
        }
        for (cell, value) in self.cells.iter().zip(tensor.data()) {
            cell.store(*value);
        }
        Ok(())
    }
}
