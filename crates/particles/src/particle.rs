//! Per-particle state and the fade-then-teleport lifecycle.

use flowfield_core::DVec2;

/// Why a particle is fading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeCause {
    /// Picked by the scheduled respawn; relocates to a random point.
    Respawn,
    /// Left the field; relocates to the opposite edge.
    Wrap,
}

/// A pending relocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    pub cause: FadeCause,
    /// Seconds spent waiting so far.
    pub elapsed: f64,
    /// Seconds to wait before relocating, fixed on entry.
    pub duration: f64,
    pub target: DVec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticleState {
    Active,
    Fading(Fade),
}

/// One moving point. Owned by the simulation; never destroyed, only recycled.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub(crate) position: DVec2,
    pub(crate) velocity: DVec2,
    pub(crate) speed_multiplier: f64,
    pub(crate) noise_offset: DVec2,
    pub(crate) state: ParticleState,
    pub(crate) clear_trail: bool,
}

impl Particle {
    pub(crate) fn spawn(position: DVec2, speed_multiplier: f64, noise_offset: DVec2) -> Self {
        Self {
            position,
            velocity: DVec2::ZERO,
            speed_multiplier,
            noise_offset,
            state: ParticleState::Active,
            clear_trail: false,
        }
    }

    pub fn position(&self) -> DVec2 {
        self.position
    }

    pub fn velocity(&self) -> DVec2 {
        self.velocity
    }

    /// Fixed at spawn; scales flow acceleration and the speed cap.
    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }

    /// Fixed at spawn; decorrelates this particle's noise forces from the rest.
    pub fn noise_offset(&self) -> DVec2 {
        self.noise_offset
    }

    pub fn state(&self) -> ParticleState {
        self.state
    }

    pub fn is_fading(&self) -> bool {
        matches!(self.state, ParticleState::Fading(_))
    }

    /// Whether the renderer should extend this particle's trail.
    pub fn is_emitting(&self) -> bool {
        !self.is_fading()
    }

    /// Raised for the tick after a teleport or bulk reset: the renderer must
    /// drop the trail outright instead of letting it decay.
    pub fn clear_trail(&self) -> bool {
        self.clear_trail
    }

    /// Where the particle will reappear, if it is fading.
    pub fn fade_target(&self) -> Option<DVec2> {
        match self.state {
            ParticleState::Fading(fade) => Some(fade.target),
            ParticleState::Active => None,
        }
    }

    /// Stops emission and freezes the particle until `duration` has elapsed.
    pub(crate) fn begin_fade(&mut self, cause: FadeCause, target: DVec2, duration: f64) {
        if self.is_fading() {
            return;
        }
        self.state = ParticleState::Fading(Fade {
            cause,
            elapsed: 0.0,
            duration,
            target,
        });
    }

    /// Advances the fade timer. Returns the completed fade when the particle
    /// teleports this tick; it lands at rest.
    pub(crate) fn advance_fade(&mut self, dt: f64) -> Option<Fade> {
        let ParticleState::Fading(fade) = &mut self.state else {
            return None;
        };
        fade.elapsed += dt;
        if fade.elapsed < fade.duration {
            return None;
        }
        let done = *fade;
        self.position = done.target;
        self.velocity = DVec2::ZERO;
        self.state = ParticleState::Active;
        self.clear_trail = true;
        Some(done)
    }
}
