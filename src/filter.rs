// src/filter.rs
//! Reconstruction filters and the adapter that turns a continuous sample
//! position into a set of weighted storage cells.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A separable reconstruction kernel.
///
/// Implementations must be stateless: blocks evaluate them from many threads
/// at once without synchronization.
pub trait ReconstructionFilter: Send + Sync + fmt::Debug {
    /// Half-width of the kernel support, in pixels.
    fn radius(&self) -> f32;

    /// Kernel value at a signed 1D offset from the sample.
    fn eval(&self, x: f32) -> f32;

    /// Kernel value at a 2D offset. Separable by default.
    fn eval_2d(&self, offset: Vector2<f32>) -> f32 {
        self.eval(offset.x) * self.eval(offset.y)
    }

    /// Number of pixels the footprint can reach past the pixel that
    /// contains the sample.
    fn border_size(&self) -> u32 {
        (self.radius() - 0.5).max(0.0).ceil() as u32
    }

    /// Whether splatting degenerates to a single nearest-pixel write.
    fn is_box(&self) -> bool {
        self.radius() <= 0.5
    }
}

/// Unit box covering exactly one pixel.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BoxFilter;

impl ReconstructionFilter for BoxFilter {
    fn radius(&self) -> f32 {
        0.5
    }

    fn eval(&self, x: f32) -> f32 {
        if x.abs() <= 0.5 {
            1.0
        } else {
            0.0
        }
    }
}

/// Linear falloff to zero at `radius`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TentFilter {
    radius: f32,
}

impl TentFilter {
    pub fn new(radius: f32) -> Self {
        Self { radius }
    }
}

impl Default for TentFilter {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ReconstructionFilter for TentFilter {
    fn radius(&self) -> f32 {
        self.radius
    }

    fn eval(&self, x: f32) -> f32 {
        (1.0 - x.abs() / self.radius).max(0.0)
    }
}

/// Truncated Gaussian, shifted so it reaches exactly zero at the radius.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GaussianFilter {
    stddev: f32,
    radius: f32,
    alpha: f32,
    bias: f32,
}

impl GaussianFilter {
    /// Gaussian with the usual support of four standard deviations.
    pub fn new(stddev: f32) -> Self {
        Self::with_radius(stddev, 4.0 * stddev)
    }

    pub fn with_radius(stddev: f32, radius: f32) -> Self {
        let alpha = -1.0 / (2.0 * stddev * stddev);
        Self {
            stddev,
            radius,
            alpha,
            bias: (alpha * radius * radius).exp(),
        }
    }

    pub fn stddev(&self) -> f32 {
        self.stddev
    }
}

impl Default for GaussianFilter {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl ReconstructionFilter for GaussianFilter {
    fn radius(&self) -> f32 {
        self.radius
    }

    fn eval(&self, x: f32) -> f32 {
        ((self.alpha * x * x).exp() - self.bias).max(0.0)
    }
}

/// One storage cell touched by a sample, with its filter weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootprintCell {
    pub row: i64,
    pub col: i64,
    pub weight: f32,
}

/// Cells a single sample contributes to.
#[derive(Debug, Clone, Default)]
pub struct Footprint {
    cells: Vec<FootprintCell>,
}

impl Footprint {
    pub fn iter(&self) -> impl Iterator<Item = &FootprintCell> {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn total_weight(&self) -> f32 {
        self.cells.iter().map(|cell| cell.weight).sum()
    }
}

/// Optional filter with nearest-pixel box behaviour when absent.
///
/// Box-like filters are dropped at construction so the splatting path never
/// has to special-case them.
#[derive(Debug, Clone, Default)]
pub struct FilterAdapter {
    filter: Option<Arc<dyn ReconstructionFilter>>,
}

impl FilterAdapter {
    pub fn new(filter: Option<Arc<dyn ReconstructionFilter>>) -> Self {
        Self {
            filter: filter.filter(|f| !f.is_box()),
        }
    }

    /// True when samples land on a single pixel.
    pub fn is_box(&self) -> bool {
        self.filter.is_none()
    }

    pub fn border_size(&self) -> u32 {
        self.filter.as_ref().map_or(0, |f| f.border_size())
    }

    /// Footprint of a sample at `p`, given in storage coordinates where the
    /// cell `(row, col)` covers `[col, col + 1) x [row, row + 1)`.
    pub fn footprint(&self, p: Point2<f32>) -> Footprint {
        let Some(filter) = self.filter.as_ref() else {
            return Footprint {
                cells: vec![FootprintCell {
                    row: p.y.floor() as i64,
                    col: p.x.floor() as i64,
                    weight: 1.0,
                }],
            };
        };

        // Kernel is centred on pixel centres, which sit at half-integers.
        let center = p - Vector2::new(0.5, 0.5);
        let radius = filter.radius();
        let (x0, x1) = ((center.x - radius).ceil() as i64, (center.x + radius).floor() as i64);
        let (y0, y1) = ((center.y - radius).ceil() as i64, (center.y + radius).floor() as i64);

        let mut cells = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)).max(0) as usize);
        for row in y0..=y1 {
            for col in x0..=x1 {
                let offset = Vector2::new(col as f32 - center.x, row as f32 - center.y);
                cells.push(FootprintCell {
                    row,
                    col,
                    weight: filter.eval_2d(offset),
                });
            }
        }
        Footprint { cells }
    }
}
