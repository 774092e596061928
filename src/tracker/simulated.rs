//! Synthetic progress estimate used when no real signal arrives

/// Simulated progress approaches this value and never passes it
pub const SIMULATED_CEILING: f64 = 99.0;

/// Fraction of the remaining distance covered per tick
const SIMULATED_STEP: f64 = 0.08;

/// Next simulated value after `current`
///
/// Asymptotic towards [`SIMULATED_CEILING`] and never lower than `current`, so
/// a value already above the ceiling (set by a real signal) is kept as is.
pub fn next_simulated_progress(current: f64) -> f64 {
    let current = if current.is_finite() {
        current.clamp(0.0, 100.0)
    } else {
        0.0
    };
    if current >= SIMULATED_CEILING {
        return current;
    }
    (current + (SIMULATED_CEILING - current) * SIMULATED_STEP).max(current)
}
