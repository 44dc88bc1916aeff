//! Health score arithmetic shared by the monitor and the health store.
//!
//! A provider's composite score combines three terms:
//!
//! ```text
//! score_0_100 = 60 * success_rate + 30 * latency_score + 10 * consistency
//! ```
//!
//! The consistency term is a placeholder fixed at 1.0, which gives every
//! provider a floor of 10 points (0.1 normalized). The degrade threshold of
//! 0.5 sits well above that floor, so a fully failing provider still trips
//! degradation.

/// Latency below which the latency score is a full 1.0, in milliseconds.
pub const LATENCY_FLOOR_MS: f64 = 50.0;

/// Latency at or above which the latency score is 0.0, in milliseconds.
pub const LATENCY_CEILING_MS: f64 = 1000.0;

/// Placeholder consistency term. A real implementation would measure
/// latency variance across the window.
pub const CONSISTENCY_SCORE: f64 = 1.0;

/// Latency component of the health score.
///
/// 1.0 below 50 ms, 0.0 at or above 1000 ms, linear in between.
pub fn latency_score(avg_latency_ms: f64) -> f64 {
    if avg_latency_ms < LATENCY_FLOOR_MS {
        1.0
    } else if avg_latency_ms >= LATENCY_CEILING_MS {
        0.0
    } else {
        1.0 - (avg_latency_ms - LATENCY_FLOOR_MS) / (LATENCY_CEILING_MS - LATENCY_FLOOR_MS)
    }
}

/// Composite health score on the 0-100 scale used by the live monitor gauge.
pub fn composite_score_0_100(success_rate: f64, avg_latency_ms: f64) -> f64 {
    success_rate * 60.0 + latency_score(avg_latency_ms) * 30.0 + CONSISTENCY_SCORE * 10.0
}

/// Composite health score normalized to the 0.0-1.0 range used for
/// threshold comparisons in the state machine.
pub fn composite_score(success_rate: f64, avg_latency_ms: f64) -> f64 {
    composite_score_0_100(success_rate, avg_latency_ms) / 100.0
}
