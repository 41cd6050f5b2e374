#![deny(unsafe_code)]
//! Flow-field particle simulation.
//!
//! A fixed population of particles samples a [`FlowFieldGrid`] every tick,
//! integrates velocity under flow, turbulence, lateral drift and an optional
//! audio-driven burst, and wraps around the field's bounds.
//!
//! Wraps and scheduled respawns never move a particle immediately. The
//! particle stops emitting trail, waits `min(trail_lifetime, fade_wait_cap)`
//! seconds in place, then jumps to its target with a one-tick clear-trail
//! signal. This keeps a renderer from drawing a streak across the field.

pub mod audio;
pub mod params;
pub mod particle;
pub mod respawn;

use flowfield_core::{
    Brush, CoherentNoise, DVec2, Engine, FieldAlgorithm, FlowError, FlowFieldGrid, Seed,
    Xorshift64,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

pub use audio::{AudioInput, ConstantAudio, Smoothed};
pub use params::SimParams;
pub use particle::{Fade, FadeCause, Particle, ParticleState};

use audio::sanitize_level;

/// Per-particle noise offsets are drawn from `[0, NOISE_OFFSET_RANGE)`.
const NOISE_OFFSET_RANGE: f64 = 1000.0;
/// Phase speed of the turbulence noise, in noise units per second.
const TURBULENCE_PHASE: f64 = 0.5;
/// Phase speed of the perpendicular drift noise.
const DRIFT_PHASE: f64 = 0.3;
/// Phase speed of the flow-direction perturbation.
const FLOW_NOISE_PHASE: f64 = 0.2;
/// Noise units per world unit for the position term of the flow perturbation.
const FLOW_NOISE_SCALE: f64 = 0.05;
/// Separates the noise channels sampled from one offset.
const CHANNEL_SHIFT: f64 = 57.0;
/// Weight of the turbulence force in the velocity update.
const TURBULENCE_WEIGHT: f64 = 1.0;
/// Weight of the drift force in the velocity update.
const DRIFT_WEIGHT: f64 = 1.0;

/// Cumulative counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimStats {
    pub ticks: u64,
    /// Particles picked by the scheduled respawn.
    pub respawns: u64,
    /// Particles that left the field.
    pub wraps: u64,
    /// Fades that reached their target.
    pub fades_completed: u64,
}

/// Forces and boosts shared by every particle in one tick.
struct TickContext {
    dt: f64,
    now: f64,
    audio: f64,
    turbulence: f64,
    spread: f64,
    speed_boost: f64,
    fade_wait: f64,
    center: DVec2,
    min: DVec2,
    max: DVec2,
}

/// A particle population steered by a flow field.
pub struct ParticleSimulation {
    field: FlowFieldGrid,
    particles: Vec<Particle>,
    params: SimParams,
    rng: Xorshift64,
    noise: CoherentNoise,
    audio: Option<Box<dyn AudioInput>>,
    audio_level: f64,
    selection: Vec<bool>,
    stats: SimStats,
    /// Set by a bulk reset; keeps every clear-trail signal raised through
    /// the next tick so a render after that tick still sees it.
    reset_pending: bool,
}

impl ParticleSimulation {
    /// Creates a simulation over `field` with `population` particles placed
    /// uniformly at random.
    ///
    /// Returns `FlowError::InvalidPopulation` if `population` is zero.
    pub fn new(
        field: FlowFieldGrid,
        population: usize,
        seed: u64,
        params: SimParams,
    ) -> Result<Self, FlowError> {
        Self::with_rng(field, population, Xorshift64::new(seed), params)
    }

    /// Builds the grid and the population from a run description, using one
    /// PRNG stream for both so the whole run replays from `seed.seed`.
    pub fn from_seed(seed: &Seed) -> Result<Self, FlowError> {
        seed.validate()?;
        let mut rng = Xorshift64::new(seed.seed);
        let field = seed.grid.build(&mut rng)?;
        Self::with_rng(
            field,
            seed.population,
            rng,
            SimParams::from_json(&seed.params),
        )
    }

    fn with_rng(
        field: FlowFieldGrid,
        population: usize,
        mut rng: Xorshift64,
        params: SimParams,
    ) -> Result<Self, FlowError> {
        if population == 0 {
            return Err(FlowError::InvalidPopulation);
        }
        let noise = CoherentNoise::new(rng.next_u32());
        let mut sim = Self {
            field,
            particles: Vec::with_capacity(population),
            params,
            rng,
            noise,
            audio: None,
            audio_level: 0.0,
            selection: vec![false; population],
            stats: SimStats::default(),
            reset_pending: false,
        };
        for _ in 0..population {
            let p = sim.fresh_particle();
            sim.particles.push(p);
        }
        debug!(
            population,
            resolution = sim.field.resolution(),
            algorithm = %sim.field.algorithm(),
            "created particle simulation"
        );
        Ok(sim)
    }

    fn fresh_particle(&mut self) -> Particle {
        let (min, max) = self.field.bounds();
        let position = self.rng.next_point(min, max);
        let (lo, hi) = speed_multiplier_range(&self.params);
        let speed_multiplier = if hi > lo {
            self.rng.next_range(lo, hi)
        } else {
            lo
        };
        let noise_offset = DVec2::new(
            self.rng.next_range(0.0, NOISE_OFFSET_RANGE),
            self.rng.next_range(0.0, NOISE_OFFSET_RANGE),
        );
        Particle::spawn(position, speed_multiplier, noise_offset)
    }

    /// Read-only snapshot for rendering.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Number of particles, fixed at construction.
    pub fn population(&self) -> usize {
        self.particles.len()
    }

    /// Particles that are integrating and emitting trail.
    pub fn active_count(&self) -> usize {
        self.particles.iter().filter(|p| !p.is_fading()).count()
    }

    /// Particles waiting out a fade before they relocate.
    pub fn fading_count(&self) -> usize {
        self.particles.iter().filter(|p| p.is_fading()).count()
    }

    /// Cumulative tick, respawn, wrap and fade counters.
    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Current parameter set.
    pub fn sim_params(&self) -> &SimParams {
        &self.params
    }

    /// Replaces the parameter set; takes effect on the next tick.
    pub fn set_params(&mut self, params: SimParams) {
        self.params = params;
    }

    /// Mutable access to the grid for brush edits and resets.
    pub fn field_mut(&mut self) -> &mut FlowFieldGrid {
        &mut self.field
    }

    /// The field's world-space rectangle, used as wrap bounds.
    pub fn bounds(&self) -> (DVec2, DVec2) {
        self.field.bounds()
    }

    /// Regenerates the field at `noise_scale` with a fresh offset drawn from
    /// the simulation's PRNG.
    pub fn regenerate_field(&mut self, algorithm: FieldAlgorithm, noise_scale: f64) {
        self.field.set_noise_scale(noise_scale);
        self.field.generate(algorithm, &mut self.rng);
    }

    /// Applies one brush drag sample to the field.
    pub fn apply_brush(&mut self, brush: &Brush, cursor: DVec2, drag: DVec2) {
        brush.apply(&mut self.field, cursor, drag);
    }

    /// Installs (or removes) the audio source polled once per tick.
    pub fn set_audio_input(&mut self, input: Option<Box<dyn AudioInput>>) {
        self.audio = input;
        if self.audio.is_none() {
            self.audio_level = 0.0;
        }
    }

    /// Audio level read on the most recent tick.
    pub fn audio_level(&self) -> f64 {
        self.audio_level
    }

    /// Moves every particle to a fresh random position at rest, redraws its
    /// speed multiplier and noise offset, and raises its clear-trail signal.
    ///
    /// Pending fades are discarded: the trail is cleared outright, so no
    /// fade wait is needed. The signal stays raised through the next
    /// [`advance`](Self::advance), so it reaches the renderer whether the
    /// host renders before or after that tick.
    pub fn clear_and_respawn(&mut self) {
        for i in 0..self.particles.len() {
            let mut p = self.fresh_particle();
            p.clear_trail = true;
            self.particles[i] = p;
        }
        self.reset_pending = true;
        debug!(population = self.particles.len(), "cleared and respawned all particles");
    }

    fn tick_context(&self, dt: f64, now: f64, audio: f64) -> TickContext {
        let p = &self.params;
        let (min, max) = self.field.bounds();
        TickContext {
            dt,
            now,
            audio,
            turbulence: p.turbulence + audio * p.audio_turbulence,
            spread: p.spread + audio * p.audio_spread,
            speed_boost: 1.0 + audio * p.audio_speed,
            fade_wait: p.fade_wait(),
            center: self.field.center(),
            min,
            max,
        }
    }

    /// Marks the particles picked by this tick's scheduled respawn in
    /// `self.selection`. Fading particles are never eligible.
    fn schedule_respawns(&mut self, dt: f64) {
        let count = respawn::scheduled_count(
            self.params.respawn_rate,
            self.particles.len(),
            dt,
            &mut self.rng,
        );
        for (slot, p) in self.selection.iter_mut().zip(&self.particles) {
            *slot = count > 0 && !p.is_fading();
        }
        if count > 0 {
            respawn::select_uniform(&mut self.selection, count, &mut self.rng);
        }
    }

    /// Flow direction at the particle, optionally perturbed by noise to keep
    /// neighbours from collapsing onto one streamline.
    fn flow_direction(&self, p: &Particle, now: f64) -> DVec2 {
        let flow = self.field.sample(p.position);
        let amount = self.params.flow_noise;
        if amount <= 0.0 {
            return flow;
        }
        let o = p.noise_offset;
        let phase = now * FLOW_NOISE_PHASE;
        let along = p.position * FLOW_NOISE_SCALE;
        let wobble = DVec2::new(
            self.noise.signed(o.x + along.x + phase, o.y + CHANNEL_SHIFT * 2.0),
            self.noise.signed(o.x + CHANNEL_SHIFT * 2.0, o.y + along.y + phase),
        );
        (flow + wobble * amount).try_normalize().unwrap_or(flow)
    }

    /// Sum of flow, turbulence, drift and burst accelerations.
    fn acceleration(&self, p: &Particle, flow: DVec2, ctx: &TickContext) -> DVec2 {
        let o = p.noise_offset;

        let tp = ctx.now * TURBULENCE_PHASE;
        let turbulence = DVec2::new(
            self.noise.signed(o.x + tp, o.y),
            self.noise.signed(o.x, o.y + tp + CHANNEL_SHIFT),
        ) * ctx.turbulence;

        let dp = ctx.now * DRIFT_PHASE;
        let drift = flow.perp()
            * self.noise.signed(o.x + CHANNEL_SHIFT + dp, o.y + CHANNEL_SHIFT)
            * ctx.spread;

        let burst = if ctx.audio > self.params.burst_threshold {
            let outward = (p.position - ctx.center).try_normalize().unwrap_or(flow);
            outward * ctx.audio * self.params.burst_strength
        } else {
            DVec2::ZERO
        };

        flow * self.params.flow_strength * p.speed_multiplier * ctx.speed_boost
            + turbulence * TURBULENCE_WEIGHT
            + drift * DRIFT_WEIGHT
            + burst
    }

    /// Integrates one active particle and handles the boundary wrap.
    fn integrate(&mut self, i: usize, ctx: &TickContext) {
        let p = &self.particles[i];
        let flow = self.flow_direction(p, ctx.now);
        let accel = self.acceleration(p, flow, ctx);
        let cap = (self.params.max_speed * p.speed_multiplier).max(0.0);

        let mut velocity = (p.velocity + accel * ctx.dt) * self.params.damping;
        velocity = velocity.clamp_length_max(cap);

        let mut position = p.position + velocity * ctx.dt;
        let jitter = self.params.position_jitter;
        if jitter > 0.0 {
            let r = DVec2::new(
                self.rng.next_range(-1.0, 1.0),
                self.rng.next_range(-1.0, 1.0),
            );
            position += r * jitter * ctx.dt;
        }

        let p = &mut self.particles[i];
        p.velocity = velocity;
        match wrap_target(position, ctx.min, ctx.max) {
            Some(target) => {
                p.velocity *= 0.5;
                p.begin_fade(FadeCause::Wrap, target, ctx.fade_wait);
                self.stats.wraps += 1;
                trace!(particle = i, x = target.x, y = target.y, "particle wrapped");
            }
            None => p.position = position,
        }
    }

    /// Advances every particle by `dt` seconds at host time `now`.
    ///
    /// Order per particle: fading particles advance their timer (and may
    /// teleport); active particles picked for respawn start fading; all other
    /// active particles integrate. A particle that finishes its fade starts
    /// moving on the following tick.
    pub fn advance(&mut self, dt: f64, now: f64) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let now = if now.is_finite() { now } else { 0.0 };

        if !std::mem::take(&mut self.reset_pending) {
            for p in &mut self.particles {
                p.clear_trail = false;
            }
        }

        let audio = sanitize_level(self.audio.as_mut().map_or(0.0, |a| a.level(dt)));
        self.audio_level = audio;

        self.schedule_respawns(dt);
        let ctx = self.tick_context(dt, now, audio);

        for i in 0..self.particles.len() {
            if self.particles[i].is_fading() {
                if let Some(fade) = self.particles[i].advance_fade(dt) {
                    self.stats.fades_completed += 1;
                    trace!(particle = i, cause = ?fade.cause, "fade completed");
                }
            } else if self.selection[i] {
                let target = self.rng.next_point(ctx.min, ctx.max);
                self.particles[i].begin_fade(FadeCause::Respawn, target, ctx.fade_wait);
                self.stats.respawns += 1;
            } else {
                self.integrate(i, &ctx);
            }
        }
        self.stats.ticks += 1;
    }
}

/// Opposite-edge position for a point outside `[min, max]`, or `None` if the
/// point is inside. Each axis wraps independently.
fn wrap_target(position: DVec2, min: DVec2, max: DVec2) -> Option<DVec2> {
    let mut target = position;
    let mut wrapped = false;
    if position.x > max.x {
        target.x = min.x;
        wrapped = true;
    } else if position.x < min.x {
        target.x = max.x;
        wrapped = true;
    }
    if position.y > max.y {
        target.y = min.y;
        wrapped = true;
    } else if position.y < min.y {
        target.y = max.y;
        wrapped = true;
    }
    wrapped.then_some(target)
}

fn speed_multiplier_range(params: &SimParams) -> (f64, f64) {
    let lo = params.speed_multiplier_min.max(0.0);
    let hi = params.speed_multiplier_max.max(lo);
    (lo, hi)
}

impl Engine for ParticleSimulation {
    fn tick(&mut self, dt: f64, now: f64) -> Result<(), FlowError> {
        self.advance(dt, now);
        Ok(())
    }

    fn field(&self) -> &FlowFieldGrid {
        &self.field
    }

    fn params(&self) -> Value {
        self.params.to_json()
    }

    fn param_schema(&self) -> Value {
        SimParams::schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowfield_core::GridConfig;

    /// Parameters with every stochastic force and respawn switched off.
    fn quiet_params() -> SimParams {
        SimParams {
            turbulence: 0.0,
            spread: 0.0,
            respawn_rate: 0.0,
            flow_noise: 0.0,
            position_jitter: 0.0,
            audio_turbulence: 0.0,
            audio_speed: 0.0,
            audio_spread: 0.0,
            ..SimParams::default()
        }
    }

    fn field(resolution: usize, size: f64, seed: u64) -> FlowFieldGrid {
        let cfg = GridConfig {
            resolution,
            size: [size, size],
            ..GridConfig::default()
        };
        cfg.build(&mut Xorshift64::new(seed)).unwrap()
    }

    fn uniform_field(direction: DVec2, size: f64) -> FlowFieldGrid {
        let mut f = field(8, size, 1);
        f.fill(direction);
        f
    }

    fn sim(population: usize, seed: u64, params: SimParams) -> ParticleSimulation {
        ParticleSimulation::new(field(16, 64.0, seed), population, seed, params).unwrap()
    }

    /// Places particle `i` at `position` with `velocity`, active.
    fn place(s: &mut ParticleSimulation, i: usize, position: DVec2, velocity: DVec2) {
        let p = &mut s.particles[i];
        p.position = position;
        p.velocity = velocity;
        p.state = ParticleState::Active;
    }

    // ---- Construction ----

    #[test]
    fn zero_population_is_rejected() {
        let result = ParticleSimulation::new(field(8, 8.0, 1), 0, 1, SimParams::default());
        assert!(matches!(result, Err(FlowError::InvalidPopulation)));
    }

    #[test]
    fn new_spawns_population_inside_bounds() {
        let s = sim(500, 3, SimParams::default());
        let (min, max) = s.bounds();
        assert_eq!(s.population(), 500);
        assert_eq!(s.active_count(), 500);
        for p in s.particles() {
            let pos = p.position();
            assert!(pos.x >= min.x && pos.x < max.x && pos.y >= min.y && pos.y < max.y);
            assert_eq!(p.velocity(), DVec2::ZERO);
            assert!((0.7..1.3).contains(&p.speed_multiplier()));
            assert!(p.is_emitting());
        }
    }

    #[test]
    fn from_seed_validates_and_builds() {
        let mut seed = Seed::new(64, 11);
        seed.grid.resolution = 8;
        seed.params = serde_json::json!({"damping": 0.5});
        let s = ParticleSimulation::from_seed(&seed).unwrap();
        assert_eq!(s.population(), 64);
        assert_eq!(s.field().resolution(), 8);
        assert!((s.sim_params().damping - 0.5).abs() < f64::EPSILON);

        let bad = Seed::new(0, 11);
        assert!(matches!(
            ParticleSimulation::from_seed(&bad),
            Err(FlowError::InvalidPopulation)
        ));
    }

    #[test]
    fn same_seed_runs_are_identical() {
        let seed = Seed::new(200, 99);
        let mut a = ParticleSimulation::from_seed(&seed).unwrap();
        let mut b = ParticleSimulation::from_seed(&seed).unwrap();
        for t in 0..120 {
            let now = t as f64 / 60.0;
            a.advance(1.0 / 60.0, now);
            b.advance(1.0 / 60.0, now);
        }
        assert!(a
            .particles()
            .iter()
            .zip(b.particles())
            .all(|(pa, pb)| pa.position().x.to_bits() == pb.position().x.to_bits()
                && pa.position().y.to_bits() == pb.position().y.to_bits()));
        assert_eq!(a.stats(), b.stats());
    }

    // ---- Integration ----

    #[test]
    fn constant_flow_advances_linearly() {
        let params = SimParams {
            flow_strength: 2.0,
            max_speed: 2.0,
            damping: 1.0,
            ..quiet_params()
        };
        let mut s = ParticleSimulation::new(uniform_field(DVec2::X, 1000.0), 1, 5, params).unwrap();
        let start = DVec2::new(10.0, 500.0);
        place(&mut s, 0, start, DVec2::ZERO);
        let m = s.particles()[0].speed_multiplier();

        let (n, dt) = (50, 1.0);
        for t in 0..n {
            s.advance(dt, t as f64);
        }
        let p = &s.particles()[0];
        let expected = start.x + params.flow_strength * m * n as f64 * dt;
        assert!(
            (p.position().x - expected).abs() < 1e-9,
            "x = {}, expected {expected}",
            p.position().x
        );
        assert_eq!(p.position().y, start.y);
        assert_eq!(s.stats().wraps, 0);
    }

    #[test]
    fn speed_is_capped_by_multiplier() {
        let params = SimParams {
            flow_strength: 100.0,
            max_speed: 3.0,
            damping: 1.0,
            ..quiet_params()
        };
        let mut s = ParticleSimulation::new(uniform_field(DVec2::Y, 1e6), 1, 8, params).unwrap();
        place(&mut s, 0, DVec2::splat(10.0), DVec2::ZERO);
        for t in 0..10 {
            s.advance(0.1, t as f64 * 0.1);
            let p = &s.particles()[0];
            assert!(p.velocity().length() <= 3.0 * p.speed_multiplier() + 1e-9);
        }
    }

    #[test]
    fn damping_decays_velocity_without_forces() {
        let params = SimParams {
            flow_strength: 0.0,
            damping: 0.5,
            max_speed: 100.0,
            ..quiet_params()
        };
        let mut s = ParticleSimulation::new(uniform_field(DVec2::X, 100.0), 1, 8, params).unwrap();
        place(&mut s, 0, DVec2::splat(50.0), DVec2::new(4.0, 0.0));
        s.advance(0.01, 0.0);
        assert!((s.particles()[0].velocity().x - 2.0).abs() < 1e-12);
        s.advance(0.01, 0.01);
        assert!((s.particles()[0].velocity().x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn audio_boost_speeds_up_flow() {
        let base = SimParams {
            flow_strength: 1.0,
            max_speed: 100.0,
            damping: 1.0,
            burst_threshold: 1.0,
            ..quiet_params()
        };
        let boosted = SimParams {
            audio_speed: 2.0,
            ..base
        };
        let run = |params: SimParams| {
            let mut s =
                ParticleSimulation::new(uniform_field(DVec2::X, 1000.0), 1, 4, params).unwrap();
            s.set_audio_input(Some(Box::new(ConstantAudio(0.5))));
            place(&mut s, 0, DVec2::splat(500.0), DVec2::ZERO);
            s.advance(0.1, 0.0);
            s.particles()[0].velocity().x
        };
        let v_base = run(base);
        let v_boost = run(boosted);
        assert!((v_boost / v_base - 2.0).abs() < 1e-9, "{v_base} vs {v_boost}");
    }

    #[test]
    fn burst_only_fires_above_threshold() {
        let params = SimParams {
            flow_strength: 0.0,
            max_speed: 100.0,
            damping: 1.0,
            burst_threshold: 0.3,
            burst_strength: 10.0,
            ..quiet_params()
        };
        let mut quiet =
            ParticleSimulation::new(uniform_field(DVec2::X, 100.0), 1, 4, params).unwrap();
        quiet.set_audio_input(Some(Box::new(ConstantAudio(0.2))));
        place(&mut quiet, 0, DVec2::new(80.0, 50.0), DVec2::ZERO);
        quiet.advance(0.1, 0.0);
        assert_eq!(quiet.particles()[0].velocity(), DVec2::ZERO);
        assert!((quiet.audio_level() - 0.2).abs() < f64::EPSILON);

        let mut loud =
            ParticleSimulation::new(uniform_field(DVec2::X, 100.0), 1, 4, params).unwrap();
        loud.set_audio_input(Some(Box::new(ConstantAudio(0.8))));
        place(&mut loud, 0, DVec2::new(80.0, 50.0), DVec2::ZERO);
        loud.advance(0.1, 0.0);
        let v = loud.particles()[0].velocity();
        // Pushed away from the centre (50, 50): along +X with |a| = 0.8 * 10.
        assert!((v.x - 0.8).abs() < 1e-9 && v.y.abs() < 1e-9, "got {v}");
    }

    #[test]
    fn missing_audio_reads_as_silence() {
        let mut s = sim(4, 2, SimParams::default());
        s.set_audio_input(Some(Box::new(ConstantAudio(f64::NAN))));
        s.advance(0.016, 0.0);
        assert_eq!(s.audio_level(), 0.0);
        s.set_audio_input(Some(Box::new(|_dt: f64| 3.0)));
        s.advance(0.016, 0.016);
        assert_eq!(s.audio_level(), 1.0);
        s.set_audio_input(None);
        assert_eq!(s.audio_level(), 0.0);
    }

    #[test]
    fn noisy_forces_stay_finite() {
        let params = SimParams {
            respawn_rate: 20.0,
            ..SimParams::default()
        };
        let mut s = sim(300, 21, params);
        s.set_audio_input(Some(Box::new(ConstantAudio(0.9))));
        for t in 0..300 {
            s.advance(1.0 / 60.0, t as f64 / 60.0);
        }
        for p in s.particles() {
            assert!(p.position().is_finite() && p.velocity().is_finite());
            assert!(p.velocity().length() <= s.sim_params().max_speed * p.speed_multiplier() + 1e-9);
        }
    }

    // ---- Wrap ----

    #[test]
    fn wrap_on_each_edge() {
        let eps = 1e-3;
        let params = SimParams {
            flow_strength: 0.0,
            damping: 1.0,
            max_speed: 100.0,
            trail_lifetime: 0.5,
            fade_wait_cap: 0.5,
            ..quiet_params()
        };
        // (start, velocity, expected fade target)
        let cases = [
            (DVec2::new(100.0 - eps, 40.0), DVec2::new(1.0, 0.0), DVec2::new(0.0, 40.0)),
            (DVec2::new(eps, 40.0), DVec2::new(-1.0, 0.0), DVec2::new(100.0, 40.0)),
            (DVec2::new(30.0, 100.0 - eps), DVec2::new(0.0, 1.0), DVec2::new(30.0, 0.0)),
            (DVec2::new(30.0, eps), DVec2::new(0.0, -1.0), DVec2::new(30.0, 100.0)),
        ];
        for (start, velocity, expected) in cases {
            let mut s =
                ParticleSimulation::new(uniform_field(DVec2::X, 100.0), 1, 6, params).unwrap();
            place(&mut s, 0, start, velocity);
            s.advance(0.01, 0.0);
            let p = &s.particles()[0];
            assert!(p.is_fading(), "particle at {start} should be fading");
            assert!(!p.is_emitting());
            let target = p.fade_target().unwrap();
            assert!((target - expected).length() < 1e-9, "target {target}, expected {expected}");
            assert!(
                (p.velocity().length() - 0.5 * velocity.length()).abs() < 1e-12,
                "velocity {} not halved",
                p.velocity()
            );
            assert_eq!(p.position(), start, "position must stay frozen until fade completes");
            assert_eq!(s.stats().wraps, 1);

            for t in 1..=60 {
                s.advance(0.01, t as f64 * 0.01);
            }
            let p = &s.particles()[0];
            assert!(!p.is_fading());
            assert_eq!(s.stats().fades_completed, 1);
        }
    }

    #[test]
    fn wrap_fade_lands_on_target_at_rest() {
        let params = SimParams {
            flow_strength: 0.0,
            damping: 1.0,
            max_speed: 100.0,
            trail_lifetime: 0.1,
            fade_wait_cap: 5.0,
            ..quiet_params()
        };
        let mut s = ParticleSimulation::new(uniform_field(DVec2::X, 100.0), 1, 6, params).unwrap();
        place(&mut s, 0, DVec2::new(99.99, 20.0), DVec2::new(4.0, 0.0));
        s.advance(0.01, 0.0);
        assert!(s.particles()[0].is_fading());
        // Fade wait 0.1 s = 10 ticks.
        let mut completed_at = None;
        for t in 1..=20 {
            s.advance(0.01, t as f64 * 0.01);
            let p = &s.particles()[0];
            if !p.is_fading() && completed_at.is_none() {
                completed_at = Some(t);
                assert_eq!(p.position(), DVec2::new(0.0, 20.0));
                assert_eq!(p.velocity(), DVec2::ZERO);
                assert!(p.clear_trail());
            }
        }
        let t = completed_at.expect("fade never completed");
        assert!((9..=11).contains(&t), "completed after {t} ticks");
        assert!(!s.particles()[0].clear_trail(), "clear signal lasts one tick");
    }

    #[test]
    fn wrap_target_leaves_inside_points_alone() {
        let (min, max) = (DVec2::ZERO, DVec2::splat(10.0));
        assert_eq!(wrap_target(DVec2::splat(5.0), min, max), None);
        assert_eq!(wrap_target(max, min, max), None);
        assert_eq!(wrap_target(min, min, max), None);
        assert_eq!(
            wrap_target(DVec2::new(11.0, -1.0), min, max),
            Some(DVec2::new(0.0, 10.0))
        );
    }

    // ---- Fading ----

    #[test]
    fn position_is_frozen_during_fade() {
        let params = SimParams {
            respawn_rate: 100.0,
            trail_lifetime: 0.5,
            fade_wait_cap: 1.0,
            ..SimParams::default()
        };
        let mut s = sim(50, 12, params);
        let dt = 1.0 / 60.0;
        let mut frozen: Vec<Option<DVec2>> = vec![None; 50];
        let mut teleports = 0;
        for t in 0..240 {
            s.advance(dt, t as f64 * dt);
            for (i, p) in s.particles().iter().enumerate() {
                match (frozen[i], p.is_fading()) {
                    (None, true) => frozen[i] = Some(p.position()),
                    (Some(pos), true) => assert_eq!(p.position(), pos, "particle {i} moved while fading"),
                    (Some(_), false) => {
                        assert!(p.clear_trail(), "particle {i} resumed without clearing its trail");
                        frozen[i] = None;
                        teleports += 1;
                    }
                    (None, false) => {}
                }
            }
        }
        assert!(teleports > 20, "only {teleports} fades completed");
    }

    #[test]
    fn fade_wait_is_capped_by_fade_wait_cap() {
        let params = SimParams {
            respawn_rate: 0.0,
            trail_lifetime: 30.0,
            fade_wait_cap: 0.2,
            flow_strength: 0.0,
            ..quiet_params()
        };
        let mut s = ParticleSimulation::new(uniform_field(DVec2::X, 10.0), 1, 2, params).unwrap();
        place(&mut s, 0, DVec2::new(10.0 - 1e-6, 5.0), DVec2::new(1.0, 0.0));
        s.params.damping = 1.0;
        s.params.max_speed = 10.0;
        s.advance(0.05, 0.0);
        assert!(s.particles()[0].is_fading());
        for t in 1..=5 {
            s.advance(0.05, t as f64 * 0.05);
        }
        assert!(!s.particles()[0].is_fading(), "wait should be capped at 0.2 s");
    }

    #[test]
    fn fading_particles_are_never_reselected() {
        let params = SimParams {
            respawn_rate: 100.0,
            trail_lifetime: 10.0,
            fade_wait_cap: 10.0,
            ..quiet_params()
        };
        let mut s = sim(10, 4, params);
        // 100% per second over one second: every particle is picked once.
        s.advance(1.0, 0.0);
        assert_eq!(s.fading_count(), 10);
        assert_eq!(s.stats().respawns, 10);
        s.advance(1.0, 1.0);
        assert_eq!(s.stats().respawns, 10, "fading particles were selected again");
        assert_eq!(s.fading_count(), 10);
    }

    #[test]
    fn respawned_particles_come_back_at_rest() {
        let params = SimParams {
            respawn_rate: 100.0,
            trail_lifetime: 0.1,
            fade_wait_cap: 1.0,
            ..quiet_params()
        };
        let mut s = sim(20, 14, params);
        s.advance(1.0, 0.0);
        assert_eq!(s.fading_count(), 20);
        s.advance(0.1, 1.0);
        assert_eq!(s.fading_count(), 0);
        let (min, max) = s.bounds();
        for p in s.particles() {
            assert_eq!(p.velocity(), DVec2::ZERO);
            assert!(p.clear_trail());
            let pos = p.position();
            assert!(pos.x >= min.x && pos.x < max.x && pos.y >= min.y && pos.y < max.y);
        }
        assert_eq!(s.stats().fades_completed, 20);
    }

    #[test]
    fn respawn_rate_is_conserved() {
        let params = SimParams {
            respawn_rate: 10.0,
            trail_lifetime: 0.02,
            fade_wait_cap: 0.02,
            flow_strength: 0.0,
            ..quiet_params()
        };
        let mut s = sim(1000, 77, params);
        let dt = 0.033;
        let ticks = 3000;
        for t in 0..ticks {
            s.advance(dt, t as f64 * dt);
        }
        let elapsed = dt * ticks as f64;
        let observed = s.stats().respawns as f64 / (1000.0 * elapsed) * 100.0;
        assert!(
            (observed - 10.0).abs() < 0.3,
            "observed respawn rate {observed}% per second"
        );
    }

    // ---- Bulk reset ----

    #[test]
    fn clear_and_respawn_resets_everything() {
        let params = SimParams {
            respawn_rate: 50.0,
            trail_lifetime: 5.0,
            fade_wait_cap: 5.0,
            ..SimParams::default()
        };
        let mut s = sim(100, 31, params);
        for t in 0..30 {
            s.advance(1.0 / 30.0, t as f64 / 30.0);
        }
        assert!(s.fading_count() > 0);
        let before: Vec<DVec2> = s.particles().iter().map(|p| p.position()).collect();
        let offsets_before: Vec<DVec2> = s.particles().iter().map(|p| p.noise_offset()).collect();

        s.clear_and_respawn();
        assert_eq!(s.fading_count(), 0);
        for (i, p) in s.particles().iter().enumerate() {
            assert_eq!(p.velocity(), DVec2::ZERO);
            assert!(p.clear_trail());
            assert!(p.is_emitting());
            assert_ne!(p.position(), before[i]);
            assert_ne!(p.noise_offset(), offsets_before[i]);
        }

        s.set_params(SimParams {
            respawn_rate: 0.0,
            ..*s.sim_params()
        });
        s.advance(1.0 / 30.0, 1.0);
        s.advance(1.0 / 30.0, 1.0 + 1.0 / 30.0);
        assert!(s.particles().iter().all(|p| !p.clear_trail()));
    }

    #[test]
    fn reset_signal_survives_the_following_tick() {
        let params = SimParams {
            respawn_rate: 0.0,
            ..SimParams::default()
        };
        let mut s = sim(50, 17, params);
        for t in 0..10 {
            s.advance(1.0 / 60.0, t as f64 / 60.0);
        }

        // Input, then tick, then render.
        s.clear_and_respawn();
        s.advance(1.0 / 60.0, 1.0);
        let raised = s.particles().iter().filter(|p| p.clear_trail()).count();
        assert_eq!(raised, 50, "renderer after the tick saw {raised}/50 clear signals");

        s.advance(1.0 / 60.0, 1.0 + 1.0 / 60.0);
        assert!(
            s.particles().iter().all(|p| !p.clear_trail()),
            "reset signal must drop after one rendered tick"
        );
    }

    // ---- Field access ----

    #[test]
    fn brush_and_regenerate_reach_the_field() {
        let mut s = sim(10, 5, SimParams::default());
        s.field_mut().fill(DVec2::X);
        let center = s.field().cell_center(8, 8);
        s.apply_brush(&Brush::new(flowfield_core::BrushMode::Directional, 4.0, 1.0), center, DVec2::Y);
        assert!((s.field().cell(8, 8) - DVec2::Y).length() < 1e-9);

        s.regenerate_field(FieldAlgorithm::CurlNoise, 0.25);
        assert_eq!(s.field().algorithm(), FieldAlgorithm::CurlNoise);
        assert!((s.field().noise_scale() - 0.25).abs() < f64::EPSILON);
        assert!(s.field().cells().iter().any(|c| (*c - DVec2::X).length() > 1e-3));
        assert!(s.field().cells().iter().all(|c| (c.length() - 1.0).abs() < 1e-6));
    }

    #[test]
    fn engine_trait_exposes_params_and_schema() {
        let mut s = sim(10, 5, SimParams::default());
        let engine: &mut dyn Engine = &mut s;
        engine.tick(0.016, 0.0).unwrap();
        assert_eq!(engine.params(), SimParams::default().to_json());
        assert!(engine.param_schema().get("respawn_rate").is_some());
        assert_eq!(engine.field().resolution(), 16);
    }

    #[test]
    fn invalid_dt_is_treated_as_zero() {
        let mut s = sim(10, 5, SimParams::default());
        let before: Vec<DVec2> = s.particles().iter().map(|p| p.position()).collect();
        s.set_params(SimParams {
            position_jitter: 0.0,
            ..SimParams::default()
        });
        s.advance(f64::NAN, 0.0);
        s.advance(-1.0, 0.0);
        for (p, b) in s.particles().iter().zip(&before) {
            assert_eq!(p.position(), *b);
        }
        assert_eq!(s.stats().ticks, 2);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn particles_never_leave_bounds(
                seed: u64,
                respawn_rate in 0.0_f64..100.0,
                flow_strength in 0.0_f64..40.0,
                level in 0.0_f64..1.0,
                dt in 0.001_f64..0.2,
            ) {
                let params = SimParams {
                    respawn_rate,
                    flow_strength,
                    max_speed: 40.0,
                    trail_lifetime: 0.1,
                    ..SimParams::default()
                };
                let mut s = sim(40, seed, params);
                s.set_audio_input(Some(Box::new(ConstantAudio(level))));
                let (min, max) = s.bounds();
                for t in 0..60 {
                    s.advance(dt, t as f64 * dt);
                    for p in s.particles() {
                        let pos = p.position();
                        prop_assert!(pos.cmpge(min).all() && pos.cmple(max).all(), "escaped to {pos}");
                        prop_assert!(p.velocity().is_finite());
                    }
                }
                prop_assert_eq!(s.active_count() + s.fading_count(), 40);
            }

            #[test]
            fn fade_clears_trail_exactly_once(seed: u64, wait in 0.0_f64..0.3) {
                let params = SimParams {
                    respawn_rate: 100.0,
                    trail_lifetime: wait,
                    ..quiet_params()
                };
                let mut s = sim(8, seed, params);
                let dt = 0.05;
                for t in 0..40 {
                    let was_fading: Vec<bool> = s.particles().iter().map(|p| p.is_fading()).collect();
                    s.advance(dt, t as f64 * dt);
                    for (p, fading) in s.particles().iter().zip(was_fading) {
                        let resumed = fading && !p.is_fading();
                        prop_assert_eq!(p.clear_trail(), resumed);
                    }
                }
            }
        }
    }
}
