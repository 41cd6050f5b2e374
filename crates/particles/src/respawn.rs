//! Scheduled respawn: how many particles to recycle this tick, and which.

use flowfield_core::Xorshift64;

/// Number of particles to schedule for respawn this tick.
///
/// The expected count `rate_percent / 100 * population * dt` is floored and
/// then rounded up with probability equal to its fractional part, so the
/// long-run rate matches `rate_percent` exactly.
pub fn scheduled_count(rate_percent: f64, population: usize, dt: f64, rng: &mut Xorshift64) -> usize {
    let expected = rate_percent / 100.0 * population as f64 * dt;
    if !(expected > 0.0) || !expected.is_finite() {
        return 0;
    }
    let whole = expected.floor();
    let extra = usize::from(rng.next_bool(expected - whole));
    whole as usize + extra
}

/// Narrows `eligible` down to a uniformly random subset of `count` entries.
///
/// On return exactly `min(count, eligible)` entries are still `true`.
/// Selection sampling: each eligible entry is kept with probability
/// `needed / remaining`, which gives every eligible entry the same chance
/// regardless of its position.
pub fn select_uniform(eligible: &mut [bool], count: usize, rng: &mut Xorshift64) {
    let mut remaining = eligible.iter().filter(|e| **e).count();
    let mut needed = count.min(remaining);
    for slot in eligible.iter_mut().filter(|e| **e) {
        let take = needed > 0 && rng.next_f64() * (remaining as f64) < needed as f64;
        remaining -= 1;
        if take {
            needed -= 1;
        } else {
            *slot = false;
        }
    }
}
