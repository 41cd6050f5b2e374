//! Editable 2D grid of unit direction vectors over a world-space rectangle.
//!
//! A [`FlowFieldGrid`] stores `resolution * resolution` unit vectors in
//! row-major order. Cell `(x, y)` is centred at
//! `origin + (x + 0.5, y + 0.5) * cell_size`. The grid is filled from coherent
//! noise (angle or curl algorithm), queried with bilinear interpolation, and
//! edited in place by falloff-weighted brushes.
//!
//! Every stored vector has unit length. Blends that cancel out keep the
//! previous direction instead of normalizing a zero vector.

use std::fmt;
use std::str::FromStr;

use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coherent::CoherentNoise;
use crate::error::FlowError;
use crate::prng::Xorshift64;

/// Default noise coordinates advanced per grid cell.
pub const DEFAULT_NOISE_SCALE: f64 = 0.1;

/// Central-difference step for the curl algorithm, in noise coordinates.
pub const CURL_EPSILON: f64 = 0.01;

/// Seed offsets are drawn from `[0, SEED_OFFSET_RANGE)` on each axis.
const SEED_OFFSET_RANGE: f64 = 10_000.0;

/// Swirl brush cells closer than this to the brush centre (in grid units)
/// have no defined tangent and are left untouched.
const SWIRL_DEAD_ZONE: f64 = 0.1;

const FULL_TURN: f64 = std::f64::consts::TAU;

/// Algorithm used to turn scalar noise into cell directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldAlgorithm {
    /// Noise value mapped linearly to an angle in [0, 2π).
    #[default]
    AngleNoise,
    /// Rotated noise gradient: divergence-free swirling flow.
    CurlNoise,
}

const ALGORITHM_NAMES: &[&str] = &["angle-noise", "curl-noise"];

impl FieldAlgorithm {
    /// Canonical name used in JSON and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            FieldAlgorithm::AngleNoise => "angle-noise",
            FieldAlgorithm::CurlNoise => "curl-noise",
        }
    }

    /// All recognized algorithm names.
    pub fn list_names() -> &'static [&'static str] {
        ALGORITHM_NAMES
    }
}

impl FromStr for FieldAlgorithm {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "angle" | "angle-noise" => Ok(FieldAlgorithm::AngleNoise),
            "curl" | "curl-noise" => Ok(FieldAlgorithm::CurlNoise),
            _ => Err(FlowError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for FieldAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Grid of unit direction vectors with noise generation, interpolated
/// sampling, and brush editing.
#[derive(Debug, Clone)]
pub struct FlowFieldGrid {
    resolution: usize,
    origin: DVec2,
    size: DVec2,
    cell_size: DVec2,
    noise_scale: f64,
    noise: CoherentNoise,
    seed_offset: DVec2,
    algorithm: FieldAlgorithm,
    cells: Vec<DVec2>,
}

impl FlowFieldGrid {
    /// Allocates a grid and fills it with the selected algorithm.
    ///
    /// The noise seed and sampling offset are drawn from `rng`. Returns
    /// `FlowError::InvalidResolution` for a zero (or overflowing) resolution
    /// and `FlowError::InvalidBounds` for a non-positive or non-finite world
    /// rectangle.
    pub fn new(
        resolution: usize,
        origin: DVec2,
        size: DVec2,
        algorithm: FieldAlgorithm,
        noise_scale: f64,
        rng: &mut Xorshift64,
    ) -> Result<Self, FlowError> {
        if resolution == 0 {
            return Err(FlowError::InvalidResolution(resolution));
        }
        let len = resolution
            .checked_mul(resolution)
            .ok_or(FlowError::InvalidResolution(resolution))?;
        if !origin.is_finite() || !size.is_finite() || size.x <= 0.0 || size.y <= 0.0 {
            return Err(FlowError::InvalidBounds {
                width: size.x,
                height: size.y,
            });
        }

        let mut grid = Self {
            resolution,
            origin,
            size,
            cell_size: size / resolution as f64,
            noise_scale,
            noise: CoherentNoise::new(rng.next_u32()),
            seed_offset: DVec2::ZERO,
            algorithm,
            cells: vec![DVec2::X; len],
        };
        grid.generate(algorithm, rng);
        Ok(grid)
    }

    /// Regenerates every cell with a fresh random seed offset.
    ///
    /// Dimensions and bounds are unchanged. Repeated calls with the same
    /// algorithm produce different fields because the offset is redrawn.
    pub fn generate(&mut self, algorithm: FieldAlgorithm, rng: &mut Xorshift64) {
        self.algorithm = algorithm;
        self.seed_offset = DVec2::new(
            rng.next_range(0.0, SEED_OFFSET_RANGE),
            rng.next_range(0.0, SEED_OFFSET_RANGE),
        );
        let res = self.resolution;
        for y in 0..res {
            for x in 0..res {
                self.cells[y * res + x] = self.noise_direction(x, y);
            }
        }
        debug!(
            resolution = res,
            algorithm = %algorithm,
            offset_x = self.seed_offset.x,
            offset_y = self.seed_offset.y,
            "generated flow field"
        );
    }

    /// Noise-derived direction for cell `(x, y)` under the current algorithm.
    fn noise_direction(&self, x: usize, y: usize) -> DVec2 {
        let p = DVec2::new(x as f64, y as f64) * self.noise_scale + self.seed_offset;
        match self.algorithm {
            FieldAlgorithm::AngleNoise => self.angle_direction(p),
            FieldAlgorithm::CurlNoise => {
                let e = CURL_EPSILON;
                let dn_dx =
                    (self.noise.get(p.x + e, p.y) - self.noise.get(p.x - e, p.y)) / (2.0 * e);
                let dn_dy =
                    (self.noise.get(p.x, p.y + e) - self.noise.get(p.x, p.y - e)) / (2.0 * e);
                DVec2::new(dn_dy, -dn_dx)
                    .try_normalize()
                    .unwrap_or_else(|| self.angle_direction(p))
            }
        }
    }

    fn angle_direction(&self, p: DVec2) -> DVec2 {
        let theta = self.noise.get(p.x, p.y) * FULL_TURN;
        DVec2::new(theta.cos(), theta.sin())
    }

    /// Number of cells along each axis.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// World-space size of one cell on each axis.
    pub fn cell_size(&self) -> DVec2 {
        self.cell_size
    }

    /// Algorithm used by the most recent generation.
    pub fn algorithm(&self) -> FieldAlgorithm {
        self.algorithm
    }

    /// Noise coordinates advanced per cell.
    pub fn noise_scale(&self) -> f64 {
        self.noise_scale
    }

    /// Changes the noise scale. Takes effect on the next [`generate`](Self::generate).
    pub fn set_noise_scale(&mut self, scale: f64) {
        self.noise_scale = scale;
    }

    /// Offset added to noise coordinates by the most recent generation.
    pub fn seed_offset(&self) -> DVec2 {
        self.seed_offset
    }

    /// World-space rectangle covered by the field as `(min, max)`.
    pub fn bounds(&self) -> (DVec2, DVec2) {
        (self.origin, self.origin + self.size)
    }

    /// Centre of the world-space rectangle.
    pub fn center(&self) -> DVec2 {
        self.origin + self.size * 0.5
    }

    /// Read-only access to the row-major cell vectors.
    pub fn cells(&self) -> &[DVec2] {
        &self.cells
    }

    /// Vector stored at cell `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if either coordinate is `>= resolution`.
    pub fn cell(&self, x: usize, y: usize) -> DVec2 {
        assert!(
            x < self.resolution && y < self.resolution,
            "cell ({x}, {y}) out of bounds for resolution {}",
            self.resolution
        );
        self.cells[y * self.resolution + x]
    }

    /// World-space centre of cell `(x, y)`.
    pub fn cell_center(&self, x: usize, y: usize) -> DVec2 {
        self.origin + (DVec2::new(x as f64, y as f64) + 0.5) * self.cell_size
    }

    /// Sets every cell to `direction` (normalized). A zero vector is ignored.
    pub fn fill(&mut self, direction: DVec2) {
        if let Some(dir) = direction.try_normalize() {
            self.cells.iter_mut().for_each(|c| *c = dir);
        }
    }

    /// Bilinearly interpolated unit direction at `world`.
    ///
    /// The query is clamped into the field's bounds, so points outside the
    /// rectangle return the edge interpolation. Non-finite queries sample the
    /// field centre.
    pub fn sample(&self, world: DVec2) -> DVec2 {
        let world = if world.is_finite() {
            world
        } else {
            self.center()
        };
        let res = self.resolution;
        let max_index = (res - 1) as f64;
        let local = ((world - self.origin) / self.size).clamp(DVec2::ZERO, DVec2::ONE);
        let g = (local * res as f64 - 0.5).clamp(DVec2::ZERO, DVec2::splat(max_index));

        let x0 = g.x.floor() as usize;
        let y0 = g.y.floor() as usize;
        let x1 = (x0 + 1).min(res - 1);
        let y1 = (y0 + 1).min(res - 1);
        let tx = g.x - x0 as f64;
        let ty = g.y - y0 as f64;

        let lower = self.cells[y0 * res + x0].lerp(self.cells[y0 * res + x1], tx);
        let upper = self.cells[y1 * res + x0].lerp(self.cells[y1 * res + x1], tx);
        lower.lerp(upper, ty).try_normalize().unwrap_or_else(|| {
            let nx = g.x.round() as usize;
            let ny = g.y.round() as usize;
            self.cells[ny * res + nx]
        })
    }

    /// Blends cells within `radius` of `center` toward `direction`.
    ///
    /// Blend weight per cell is [`brush_weight`]. A zero `direction` or a
    /// non-positive radius leaves the field unchanged.
    pub fn apply_brush(&mut self, center: DVec2, radius: f64, direction: DVec2, strength: f64) {
        let Some(target) = direction.try_normalize() else {
            return;
        };
        self.blend_region(center, radius, strength, |_| Some(target));
    }

    /// Blends cells toward the tangent of the circle around `center`,
    /// producing counter-clockwise rotation for positive strength.
    pub fn apply_swirl_brush(&mut self, center: DVec2, radius: f64, strength: f64) {
        let cell_size = self.cell_size;
        self.blend_region(center, radius, strength, |offset| {
            if (offset / cell_size).length() < SWIRL_DEAD_ZONE {
                return None;
            }
            offset.perp().try_normalize()
        });
    }

    /// Blends cells toward `center` (attract) or away from it (`outward`).
    pub fn apply_radial_brush(&mut self, center: DVec2, radius: f64, strength: f64, outward: bool) {
        self.blend_region(center, radius, strength, |offset| {
            offset
                .try_normalize()
                .map(|away| if outward { away } else { -away })
        });
    }

    /// Visits every in-grid cell whose centre lies within `radius` of
    /// `center` and blends it toward `target(cell_center - center)`.
    /// Cells for which `target` returns `None` are skipped.
    fn blend_region<F>(&mut self, center: DVec2, radius: f64, strength: f64, target: F)
    where
        F: Fn(DVec2) -> Option<DVec2>,
    {
        if !(radius > 0.0) || !center.is_finite() || !radius.is_finite() {
            return;
        }
        let res = self.resolution;
        let max_index = (res - 1) as f64;
        let lo = ((center - radius - self.origin) / self.cell_size - 0.5).floor();
        let hi = ((center + radius - self.origin) / self.cell_size - 0.5).ceil();
        if hi.x < 0.0 || hi.y < 0.0 || lo.x > max_index || lo.y > max_index {
            return;
        }
        let (x_lo, x_hi) = (lo.x.max(0.0) as usize, hi.x.min(max_index) as usize);
        let (y_lo, y_hi) = (lo.y.max(0.0) as usize, hi.y.min(max_index) as usize);

        for y in y_lo..=y_hi {
            for x in x_lo..=x_hi {
                let offset = self.cell_center(x, y) - center;
                let weight = brush_weight(offset.length(), radius, strength);
                if weight <= 0.0 {
                    continue;
                }
                let Some(goal) = target(offset) else {
                    continue;
                };
                let idx = y * res + x;
                let current = self.cells[idx];
                self.cells[idx] = current.lerp(goal, weight).try_normalize().unwrap_or(current);
            }
        }
    }
}

/// Blend weight a brush applies at `distance` from its centre.
///
/// Linear falloff `strength * (1 - distance / radius)`, clamped to [0, 1];
/// zero beyond the radius or for a non-positive radius.
pub fn brush_weight(distance: f64, radius: f64, strength: f64) -> f64 {
    if !(radius > 0.0) || !(distance <= radius) {
        return 0.0;
    }
    (strength * (1.0 - distance / radius)).clamp(0.0, 1.0)
}
