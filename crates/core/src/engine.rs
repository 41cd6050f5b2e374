//! The `Engine` trait: a field-driven simulation advanced by an external loop.
//!
//! The host (a render loop, a test, the CLI) owns the clock and calls
//! [`Engine::tick`] once per frame. Read-only accessors let a visualization
//! layer inspect state without depending on the concrete engine type.

use crate::error::FlowError;
use crate::grid::FlowFieldGrid;
use serde_json::Value;

/// Core trait for flow-field engines.
///
/// The trait is object-safe so hosts can hold a `Box<dyn Engine>`.
pub trait Engine {
    /// Advance the simulation by `dt` seconds; `now` is the host clock in
    /// seconds and drives time-phased noise.
    fn tick(&mut self, dt: f64, now: f64) -> Result<(), FlowError>;

    /// The flow field steering the simulation.
    fn field(&self) -> &FlowFieldGrid;

    /// Current parameter values as a JSON object.
    fn params(&self) -> Value;

    /// Schema describing all tunable parameters, their types, ranges, and defaults.
    fn param_schema(&self) -> Value;
}
