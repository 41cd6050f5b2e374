//! Global simulation parameters.

use flowfield_core::params::param_f64;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Default acceleration along the sampled flow direction.
const DEFAULT_FLOW_STRENGTH: f64 = 4.0;
/// Default per-tick velocity retention.
const DEFAULT_DAMPING: f64 = 0.95;
/// Default speed cap before the per-particle multiplier.
const DEFAULT_MAX_SPEED: f64 = 6.0;
const DEFAULT_TURBULENCE: f64 = 0.5;
const DEFAULT_SPREAD: f64 = 0.3;
/// Default percentage of the population re-seeded per second.
const DEFAULT_RESPAWN_RATE: f64 = 2.0;
/// Default trail lifetime in seconds, shared with the renderer.
const DEFAULT_TRAIL_LIFETIME: f64 = 1.5;
const DEFAULT_FLOW_NOISE: f64 = 0.15;
const DEFAULT_POSITION_JITTER: f64 = 0.05;
/// Default upper bound on the fade wait, in seconds.
const DEFAULT_FADE_WAIT_CAP: f64 = 1.0;
const DEFAULT_AUDIO_TURBULENCE: f64 = 2.0;
const DEFAULT_AUDIO_SPEED: f64 = 1.0;
const DEFAULT_AUDIO_SPREAD: f64 = 1.5;
/// Audio level above which the radial burst force kicks in.
const DEFAULT_BURST_THRESHOLD: f64 = 0.3;
const DEFAULT_BURST_STRENGTH: f64 = 8.0;
const DEFAULT_SPEED_MULTIPLIER_MIN: f64 = 0.7;
const DEFAULT_SPEED_MULTIPLIER_MAX: f64 = 1.3;

/// Tunable parameters shared by every particle.
///
/// All values may be replaced at any time; the next tick picks them up.
/// The speed multiplier range only affects particles spawned afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    pub flow_strength: f64,
    pub damping: f64,
    pub max_speed: f64,
    pub turbulence: f64,
    /// Lateral drift perpendicular to the flow.
    pub spread: f64,
    /// Percent of the population scheduled for respawn per second.
    pub respawn_rate: f64,
    pub trail_lifetime: f64,
    /// Strength of the noise perturbation on the sampled flow direction.
    pub flow_noise: f64,
    pub position_jitter: f64,
    pub fade_wait_cap: f64,
    pub audio_turbulence: f64,
    pub audio_speed: f64,
    pub audio_spread: f64,
    pub burst_threshold: f64,
    pub burst_strength: f64,
    pub speed_multiplier_min: f64,
    pub speed_multiplier_max: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            flow_strength: DEFAULT_FLOW_STRENGTH,
            damping: DEFAULT_DAMPING,
            max_speed: DEFAULT_MAX_SPEED,
            turbulence: DEFAULT_TURBULENCE,
            spread: DEFAULT_SPREAD,
            respawn_rate: DEFAULT_RESPAWN_RATE,
            trail_lifetime: DEFAULT_TRAIL_LIFETIME,
            flow_noise: DEFAULT_FLOW_NOISE,
            position_jitter: DEFAULT_POSITION_JITTER,
            fade_wait_cap: DEFAULT_FADE_WAIT_CAP,
            audio_turbulence: DEFAULT_AUDIO_TURBULENCE,
            audio_speed: DEFAULT_AUDIO_SPEED,
            audio_spread: DEFAULT_AUDIO_SPREAD,
            burst_threshold: DEFAULT_BURST_THRESHOLD,
            burst_strength: DEFAULT_BURST_STRENGTH,
            speed_multiplier_min: DEFAULT_SPEED_MULTIPLIER_MIN,
            speed_multiplier_max: DEFAULT_SPEED_MULTIPLIER_MAX,
        }
    }
}

impl SimParams {
    /// Extracts parameters from a JSON object, falling back to the current
    /// defaults for anything missing or mistyped.
    pub fn from_json(params: &Value) -> Self {
        Self::default().merged(params)
    }

    /// Returns a copy with any keys present in `params` overridden.
    pub fn merged(&self, params: &Value) -> Self {
        Self {
            flow_strength: param_f64(params, "flow_strength", self.flow_strength),
            damping: param_f64(params, "damping", self.damping),
            max_speed: param_f64(params, "max_speed", self.max_speed),
            turbulence: param_f64(params, "turbulence", self.turbulence),
            spread: param_f64(params, "spread", self.spread),
            respawn_rate: param_f64(params, "respawn_rate", self.respawn_rate),
            trail_lifetime: param_f64(params, "trail_lifetime", self.trail_lifetime),
            flow_noise: param_f64(params, "flow_noise", self.flow_noise),
            position_jitter: param_f64(params, "position_jitter", self.position_jitter),
            fade_wait_cap: param_f64(params, "fade_wait_cap", self.fade_wait_cap),
            audio_turbulence: param_f64(params, "audio_turbulence", self.audio_turbulence),
            audio_speed: param_f64(params, "audio_speed", self.audio_speed),
            audio_spread: param_f64(params, "audio_spread", self.audio_spread),
            burst_threshold: param_f64(params, "burst_threshold", self.burst_threshold),
            burst_strength: param_f64(params, "burst_strength", self.burst_strength),
            speed_multiplier_min: param_f64(
                params,
                "speed_multiplier_min",
                self.speed_multiplier_min,
            ),
            speed_multiplier_max: param_f64(
                params,
                "speed_multiplier_max",
                self.speed_multiplier_max,
            ),
        }
    }

    /// How long a fading particle waits before relocating:
    /// `min(trail_lifetime, fade_wait_cap)`, never negative.
    pub fn fade_wait(&self) -> f64 {
        self.trail_lifetime.min(self.fade_wait_cap).max(0.0)
    }

    /// Current values as a JSON object.
    pub fn to_json(&self) -> Value {
        json!({
            "flow_strength": self.flow_strength,
            "damping": self.damping,
            "max_speed": self.max_speed,
            "turbulence": self.turbulence,
            "spread": self.spread,
            "respawn_rate": self.respawn_rate,
            "trail_lifetime": self.trail_lifetime,
            "flow_noise": self.flow_noise,
            "position_jitter": self.position_jitter,
            "fade_wait_cap": self.fade_wait_cap,
            "audio_turbulence": self.audio_turbulence,
            "audio_speed": self.audio_speed,
            "audio_spread": self.audio_spread,
            "burst_threshold": self.burst_threshold,
            "burst_strength": self.burst_strength,
            "speed_multiplier_min": self.speed_multiplier_min,
            "speed_multiplier_max": self.speed_multiplier_max,
        })
    }

    /// Types, defaults, suggested UI ranges and descriptions for every parameter.
    pub fn schema() -> Value {
        fn number(default: f64, min: f64, max: f64, description: &str) -> Value {
            json!({
                "type": "number",
                "default": default,
                "min": min,
                "max": max,
                "description": description,
            })
        }
        json!({
            "flow_strength": number(DEFAULT_FLOW_STRENGTH, 0.0, 20.0,
                "Acceleration along the sampled flow direction"),
            "damping": number(DEFAULT_DAMPING, 0.0, 1.0,
                "Fraction of velocity kept each tick"),
            "max_speed": number(DEFAULT_MAX_SPEED, 0.0, 50.0,
                "Speed cap, scaled by each particle's speed multiplier"),
            "turbulence": number(DEFAULT_TURBULENCE, 0.0, 5.0,
                "Noise-driven force in a free direction"),
            "spread": number(DEFAULT_SPREAD, 0.0, 5.0,
                "Noise-driven drift perpendicular to the flow"),
            "respawn_rate": number(DEFAULT_RESPAWN_RATE, 0.0, 100.0,
                "Percent of the population re-seeded per second"),
            "trail_lifetime": number(DEFAULT_TRAIL_LIFETIME, 0.0, 10.0,
                "Seconds a trail segment stays visible"),
            "flow_noise": number(DEFAULT_FLOW_NOISE, 0.0, 2.0,
                "Noise added to the sampled direction to break up lanes"),
            "position_jitter": number(DEFAULT_POSITION_JITTER, 0.0, 1.0,
                "Random positional offset per second"),
            "fade_wait_cap": number(DEFAULT_FADE_WAIT_CAP, 0.0, 10.0,
                "Upper bound on the fade wait before relocation"),
            "audio_turbulence": number(DEFAULT_AUDIO_TURBULENCE, 0.0, 10.0,
                "Turbulence added per unit of audio level"),
            "audio_speed": number(DEFAULT_AUDIO_SPEED, 0.0, 5.0,
                "Flow speed boost per unit of audio level"),
            "audio_spread": number(DEFAULT_AUDIO_SPREAD, 0.0, 10.0,
                "Spread added per unit of audio level"),
            "burst_threshold": number(DEFAULT_BURST_THRESHOLD, 0.0, 1.0,
                "Audio level above which the radial burst applies"),
            "burst_strength": number(DEFAULT_BURST_STRENGTH, 0.0, 50.0,
                "Radial burst force per unit of audio level"),
            "speed_multiplier_min": number(DEFAULT_SPEED_MULTIPLIER_MIN, 0.0, 2.0,
                "Lower bound of the per-particle speed multiplier"),
            "speed_multiplier_max": number(DEFAULT_SPEED_MULTIPLIER_MAX, 0.0, 3.0,
                "Upper bound of the per-particle speed multiplier"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_uses_defaults_for_empty_json() {
        assert_eq!(SimParams::from_json(&json!({})), SimParams::default());
    }

    #[test]
    fn from_json_extracts_custom_values() {
        let p = SimParams::from_json(&json!({
            "flow_strength": 2,
            "damping": 0.9,
            "respawn_rate": 12.5,
            "turbulence": "loud",
        }));
        assert!((p.flow_strength - 2.0).abs() < f64::EPSILON);
        assert!((p.damping - 0.9).abs() < f64::EPSILON);
        assert!((p.respawn_rate - 12.5).abs() < f64::EPSILON);
        assert!((p.turbulence - DEFAULT_TURBULENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn merged_keeps_existing_values() {
        let base = SimParams {
            spread: 2.0,
            ..SimParams::default()
        };
        let p = base.merged(&json!({"max_speed": 1.5}));
        assert!((p.spread - 2.0).abs() < f64::EPSILON);
        assert!((p.max_speed - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn to_json_round_trips_through_from_json() {
        let p = SimParams {
            flow_strength: 1.25,
            fade_wait_cap: 0.4,
            burst_strength: 3.0,
            ..SimParams::default()
        };
        assert_eq!(SimParams::from_json(&p.to_json()), p);
    }

    #[test]
    fn schema_covers_every_json_key() {
        let schema = SimParams::schema();
        let values = SimParams::default().to_json();
        let keys = values.as_object().unwrap();
        assert_eq!(schema.as_object().unwrap().len(), keys.len());
        for (key, value) in keys {
            let entry = &schema[key];
            assert_eq!(entry["type"], "number", "{key} missing type");
            assert_eq!(&entry["default"], value, "{key} default mismatch");
            assert!(entry.get("description").is_some(), "{key} missing description");
        }
    }

    #[test]
    fn fade_wait_is_capped() {
        let long = SimParams {
            trail_lifetime: 8.0,
            fade_wait_cap: 1.0,
            ..SimParams::default()
        };
        assert!((long.fade_wait() - 1.0).abs() < f64::EPSILON);
        let short = SimParams {
            trail_lifetime: 0.25,
            ..long
        };
        assert!((short.fade_wait() - 0.25).abs() < f64::EPSILON);
        let negative = SimParams {
            trail_lifetime: -1.0,
            ..long
        };
        assert_eq!(negative.fade_wait(), 0.0);
    }

    #[test]
    fn serde_fills_missing_fields() {
        let p: SimParams = serde_json::from_str(r#"{"damping": 1.0}"#).unwrap();
        assert!((p.damping - 1.0).abs() < f64::EPSILON);
        assert!((p.max_speed - DEFAULT_MAX_SPEED).abs() < f64::EPSILON);
    }
}
