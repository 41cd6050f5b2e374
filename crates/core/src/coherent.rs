//! Two-argument coherent noise mapped into [0, 1].
//!
//! Everything that needs smooth randomness (field generation, particle
//! turbulence and drift, flow perturbation) samples a [`CoherentNoise`].
//! The underlying generator is the `noise` crate's Perlin; its [-1, 1]
//! output is remapped linearly and clamped so callers can treat the value
//! as a fraction.

use std::fmt;

use noise::{NoiseFn, Perlin};

/// Seeded 2D Perlin noise returning values in [0, 1].
#[derive(Clone)]
pub struct CoherentNoise {
    perlin: Perlin,
    seed: u32,
}

impl CoherentNoise {
    /// Creates a noise source for the given seed.
    pub fn new(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            seed,
        }
    }

    /// Seed this source was built with.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Samples the noise at `(x, y)`. Always in [0, 1].
    pub fn get(&self, x: f64, y: f64) -> f64 {
        let raw = self.perlin.get([x, y]);
        ((raw + 1.0) * 0.5).clamp(0.0, 1.0)
    }

    /// Samples the noise and recentres it to [-1, 1].
    pub fn signed(&self, x: f64, y: f64) -> f64 {
        self.get(x, y) * 2.0 - 1.0
    }
}

impl fmt::Debug for CoherentNoise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoherentNoise")
            .field("seed", &self.seed)
            .finish()
    }
}
