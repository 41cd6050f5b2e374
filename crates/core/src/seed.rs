//! Reproducible description of a simulation run.
//!
//! A [`Seed`] captures everything needed to replay a headless run: grid
//! layout, population, parameter overrides, PRNG seed, tick count and tick
//! length. Hosts load it from JSON and hand it to the simulation crate.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::grid::{FieldAlgorithm, FlowFieldGrid, DEFAULT_NOISE_SCALE};
use crate::params::{param_f64, param_parsed, param_usize};
use crate::prng::Xorshift64;

const DEFAULT_RESOLUTION: usize = 64;
const DEFAULT_WORLD_SIZE: f64 = 64.0;

/// Layout and generation settings for a [`FlowFieldGrid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub resolution: usize,
    /// World-space lower-left corner `[x, y]`.
    pub origin: [f64; 2],
    /// World-space extent `[width, height]`.
    pub size: [f64; 2],
    pub noise_scale: f64,
    pub algorithm: FieldAlgorithm,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            origin: [0.0, 0.0],
            size: [DEFAULT_WORLD_SIZE, DEFAULT_WORLD_SIZE],
            noise_scale: DEFAULT_NOISE_SCALE,
            algorithm: FieldAlgorithm::AngleNoise,
        }
    }
}

impl GridConfig {
    /// Returns a copy with `resolution`, `noise_scale`, `algorithm`, `width`
    /// and `height` overridden by any of those keys present in a flat JSON
    /// object. Missing or mistyped keys keep the current value; the origin
    /// is never touched.
    pub fn merged(&self, params: &serde_json::Value) -> Self {
        Self {
            resolution: param_usize(params, "resolution", self.resolution),
            origin: self.origin,
            size: [
                param_f64(params, "width", self.size[0]),
                param_f64(params, "height", self.size[1]),
            ],
            noise_scale: param_f64(params, "noise_scale", self.noise_scale),
            algorithm: param_parsed(params, "algorithm", self.algorithm),
        }
    }

    pub fn origin(&self) -> DVec2 {
        DVec2::from(self.origin)
    }

    pub fn size(&self) -> DVec2 {
        DVec2::from(self.size)
    }

    /// Builds and generates a grid, drawing its noise seed from `rng`.
    pub fn build(&self, rng: &mut Xorshift64) -> Result<FlowFieldGrid, FlowError> {
        FlowFieldGrid::new(
            self.resolution,
            self.origin(),
            self.size(),
            self.algorithm,
            self.noise_scale,
            rng,
        )
    }
}

/// Reproducible description of a headless run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Seed {
    #[serde(default)]
    pub grid: GridConfig,
    pub population: usize,
    /// Simulation parameter overrides; missing keys use defaults.
    #[serde(default = "empty_object")]
    pub params: serde_json::Value,
    pub seed: u64,
    #[serde(default)]
    pub ticks: usize,
    #[serde(default = "default_dt")]
    pub dt: f64,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_dt() -> f64 {
    1.0 / 60.0
}

impl Seed {
    /// Creates a seed with the default grid, empty params, zero ticks and a
    /// 60 Hz tick length.
    pub fn new(population: usize, seed: u64) -> Self {
        Self {
            grid: GridConfig::default(),
            population,
            params: empty_object(),
            seed,
            ticks: 0,
            dt: default_dt(),
        }
    }

    /// Checks everything a simulation needs before construction: non-zero
    /// resolution and population, positive finite world size, and a
    /// non-negative finite tick length.
    pub fn validate(&self) -> Result<(), FlowError> {
        let res = self.grid.resolution;
        if res == 0 || res.checked_mul(res).is_none() {
            return Err(FlowError::InvalidResolution(res));
        }
        let [w, h] = self.grid.size;
        if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
            return Err(FlowError::InvalidBounds {
                width: w,
                height: h,
            });
        }
        if self.population == 0 {
            return Err(FlowError::InvalidPopulation);
        }
        if !(self.dt.is_finite() && self.dt >= 0.0) {
            return Err(FlowError::InvalidTimeStep(self.dt));
        }
        Ok(())
    }
}
