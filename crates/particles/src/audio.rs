//! External audio level input.
//!
//! The simulation reads one normalized level per tick. Without an input the
//! level is 0, which leaves every audio-boosted term at its base value.

/// Source of a normalized audio level in [0, 1], polled once per tick.
pub trait AudioInput {
    /// Level for the tick that is `dt` seconds after the previous poll.
    fn level(&mut self, dt: f64) -> f64;
}

/// Fixed level, handy for tests and for a manual "audio" slider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantAudio(pub f64);

impl AudioInput for ConstantAudio {
    fn level(&mut self, _dt: f64) -> f64 {
        self.0
    }
}

impl<F> AudioInput for F
where
    F: FnMut(f64) -> f64,
{
    fn level(&mut self, dt: f64) -> f64 {
        self(dt)
    }
}

/// Exponentially smoothed wrapper around another input.
///
/// `rate` is in 1/seconds; the smoothed value closes `1 - e^(-rate*dt)` of
/// the gap to the raw level each poll, independent of frame rate.
#[derive(Debug, Clone)]
pub struct Smoothed<A> {
    inner: A,
    rate: f64,
    current: f64,
}

impl<A: AudioInput> Smoothed<A> {
    pub fn new(inner: A, rate: f64) -> Self {
        Self {
            inner,
            rate: rate.max(0.0),
            current: 0.0,
        }
    }
}

impl<A: AudioInput> AudioInput for Smoothed<A> {
    fn level(&mut self, dt: f64) -> f64 {
        let target = sanitize_level(self.inner.level(dt));
        let blend = 1.0 - (-self.rate * dt.max(0.0)).exp();
        self.current += blend * (target - self.current);
        self.current
    }
}

/// Clamps a raw level into [0, 1]; non-finite levels read as silence.
pub fn sanitize_level(level: f64) -> f64 {
    if level.is_finite() {
        level.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
