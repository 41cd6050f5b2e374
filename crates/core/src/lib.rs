#![deny(unsafe_code)]
//! Core types for the flow-field simulation.
//!
//! Provides the [`FlowFieldGrid`] (noise generation, bilinear sampling and
//! brush editing), [`Brush`] strokes, [`CoherentNoise`], the `Engine` tick
//! trait, the `Xorshift64` PRNG, the [`Seed`] run description, and
//! parameter helpers.

pub mod brush;
pub mod coherent;
pub mod engine;
pub mod error;
pub mod grid;
pub mod params;
pub mod prng;
pub mod seed;

pub use brush::{Brush, BrushMode};
pub use coherent::CoherentNoise;
pub use engine::Engine;
pub use error::FlowError;
pub use glam::DVec2;
pub use grid::{brush_weight, FieldAlgorithm, FlowFieldGrid};
pub use prng::Xorshift64;
pub use seed::{GridConfig, Seed};
