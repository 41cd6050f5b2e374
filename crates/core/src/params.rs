//! Helpers for pulling typed parameters out of a `serde_json::Value` object.
//!
//! The helpers never fail: a missing or mistyped key yields the default, so
//! a live parameter panel can push partial updates.

use std::str::FromStr;

use serde_json::Value;

/// Extracts an `f64` from `params[name]`, returning `default` if missing or wrong type.
///
/// Integers are accepted and converted. Non-finite results fall back to `default`.
pub fn param_f64(params: &Value, name: &str, default: f64) -> f64 {
    params
        .get(name)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// Extracts a `usize` from `params[name]`, returning `default` if missing or
/// not a non-negative integer.
pub fn param_usize(params: &Value, name: &str, default: usize) -> usize {
    params
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(default)
}

/// Extracts a string from `params[name]` and parses it with [`FromStr`],
/// returning `default` if missing, not a string, or unparseable.
pub fn param_parsed<T: FromStr>(params: &Value, name: &str, default: T) -> T {
    params
        .get(name)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
