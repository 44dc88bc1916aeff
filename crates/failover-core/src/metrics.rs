//! Metrics instrumentation for the monitor and the controller.

use std::time::Duration;

use crate::state::FailoverState;

/// Record one DNS probe against a nameserver.
pub fn record_probe(provider: &str, nameserver: &str, success: bool, duration: Duration) {
    metrics::histogram!(
        "dns_query_duration_seconds",
        "provider" => provider.to_string(),
        "nameserver" => nameserver.to_string(),
    )
    .record(duration.as_secs_f64());

    if success {
        metrics::counter!(
            "dns_query_success_total",
            "provider" => provider.to_string(),
            "nameserver" => nameserver.to_string(),
        )
        .increment(1);
    } else {
        metrics::counter!(
            "dns_query_failure_total",
            "provider" => provider.to_string(),
            "nameserver" => nameserver.to_string(),
        )
        .increment(1);
    }
}

/// Record the live per-provider health score on the 0-100 scale.
pub fn record_provider_health_score(provider: &str, score_0_100: f64) {
    metrics::gauge!(
        "dns_provider_health_score",
        "provider" => provider.to_string(),
    )
    .set(score_0_100);
}

/// Record the controller's current state as a one-hot gauge set.
pub fn record_controller_state(current: FailoverState) {
    for state in [
        FailoverState::Healthy,
        FailoverState::Degraded,
        FailoverState::FailingOver,
        FailoverState::FailedOver,
        FailoverState::Recovering,
    ] {
        metrics::gauge!(
            "failover_controller_state",
            "state" => state.as_str(),
        )
        .set(if state == current { 1.0 } else { 0.0 });
    }
}

/// Record an accepted state transition.
pub fn record_transition(from: FailoverState, to: FailoverState) {
    metrics::counter!(
        "failover_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str(),
    )
    .increment(1);
}

/// Record a transition blocked by the safety validator.
pub fn record_safety_block(kind: &'static str) {
    metrics::counter!(
        "failover_safety_blocks_total",
        "reason" => kind,
    )
    .increment(1);
}
