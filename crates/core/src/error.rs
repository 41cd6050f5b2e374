//! Error types for the flow-field core.

use thiserror::Error;

/// Errors produced when building or configuring a flow field or simulation.
///
/// Run-time numeric problems (zero-length vectors, out-of-bounds queries)
/// never surface here; they are clamped or guarded at the call site.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Grid resolution was zero or `resolution * resolution` overflowed.
    #[error("invalid resolution {0}: must be at least 1")]
    InvalidResolution(usize),

    /// World-space size was non-positive or not finite.
    #[error("invalid bounds: size ({width}, {height}) must be positive and finite")]
    InvalidBounds { width: f64, height: f64 },

    /// Particle population was zero.
    #[error("invalid population: particle count must be at least 1")]
    InvalidPopulation,

    /// A field generation algorithm name was not recognized.
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// A brush mode name was not recognized.
    #[error("unknown brush mode: {0}")]
    UnknownBrushMode(String),

    /// Tick length was negative or not finite.
    #[error("invalid time step {0}: must be a non-negative finite number of seconds")]
    InvalidTimeStep(f64),
}
