//! Transition safety policy.
//!
//! [`validate_transition`] is a pure function over the persisted state: it
//! encodes the allowed transition graph and the temporal guards (minimum
//! dwell, failover cooldown, daily cap, manual-auth gate). Checks run in
//! order and the first failure wins, so the returned reason names the
//! tightest guard that blocked the move.
//!
//! The recovery cooldown is deliberately *not* here: it gates the failback
//! action inside the RECOVERING handler, not the transition into or out of
//! RECOVERING.

use chrono::{DateTime, Duration, Utc};

use crate::state::{ControllerState, FailoverState};

/// Tunable guard parameters for the state machine.
#[derive(Debug, Clone)]
pub struct SafetyParams {
    /// Minimum wall-clock time in a state before any transition out.
    pub min_time_in_state: Duration,
    /// Minimum wall-clock time between two successive failovers.
    pub failover_cooldown: Duration,
    /// Maximum failovers permitted per calendar day.
    pub max_daily_failovers: u32,
    /// When set, every failover requires out-of-band approval; since no
    /// approval channel exists, entering FAILING_OVER is rejected outright.
    pub require_manual_auth: bool,
    /// How long the primary must stay healthy in RECOVERING before failback.
    pub recovery_cooldown: Duration,
}

impl Default for SafetyParams {
    fn default() -> Self {
        Self {
            min_time_in_state: Duration::minutes(5),
            failover_cooldown: Duration::hours(1),
            max_daily_failovers: 1,
            require_manual_auth: false,
            recovery_cooldown: Duration::minutes(10),
        }
    }
}

/// Why a transition was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyViolation {
    Topology {
        from: FailoverState,
        to: FailoverState,
    },
    MinTimeInState {
        elapsed: Duration,
        required: Duration,
    },
    FailoverCooldown {
        since_last: Duration,
        required: Duration,
    },
    DailyCapReached {
        count: u32,
        max: u32,
    },
    ManualAuthRequired,
}

impl SafetyViolation {
    /// Coarse label for the safety-block metric.
    pub fn kind(&self) -> &'static str {
        match self {
            SafetyViolation::Topology { .. } => "topology",
            SafetyViolation::MinTimeInState { .. } => "min_time_in_state",
            SafetyViolation::FailoverCooldown { .. } => "failover_cooldown",
            SafetyViolation::DailyCapReached { .. } => "daily_cap",
            SafetyViolation::ManualAuthRequired => "manual_auth",
        }
    }
}

impl std::fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyViolation::Topology { from, to } => {
                write!(f, "transition {} -> {} is not allowed", from, to)
            }
            SafetyViolation::MinTimeInState { elapsed, required } => write!(
                f,
                "minimum time in state not met ({}s elapsed, {}s required)",
                elapsed.num_seconds(),
                required.num_seconds()
            ),
            SafetyViolation::FailoverCooldown {
                since_last,
                required,
            } => write!(
                f,
                "failover cooldown active ({}s since last failover, {}s required)",
                since_last.num_seconds(),
                required.num_seconds()
            ),
            SafetyViolation::DailyCapReached { count, max } => {
                write!(f, "daily failover cap reached ({}/{})", count, max)
            }
            SafetyViolation::ManualAuthRequired => {
                write!(f, "manual authorization required for failover")
            }
        }
    }
}

impl std::error::Error for SafetyViolation {}

/// Whether the transition graph permits `from -> to`.
fn topology_allows(from: FailoverState, to: FailoverState) -> bool {
    use FailoverState::*;
    matches!(
        (from, to),
        (Healthy, Degraded)
            | (Degraded, Healthy)
            | (Degraded, FailingOver)
            | (FailingOver, FailedOver)
            | (FailingOver, Degraded)
            | (FailedOver, Recovering)
            | (Recovering, Healthy)
            | (Recovering, FailedOver)
    )
}

/// Validate a proposed transition against the safety policy.
///
/// `now` is passed in so the function stays pure and testable at arbitrary
/// points in time.
///
/// FAILING_OVER is transient: its entry already passed the cooldown and
/// daily-cap guards, so transitions *out* of it are exempt from the
/// minimum-dwell check. Without the exemption the machine could never leave
/// FAILING_OVER before the dwell elapsed.
pub fn validate_transition(
    state: &ControllerState,
    to: FailoverState,
    now: DateTime<Utc>,
    params: &SafetyParams,
) -> Result<(), SafetyViolation> {
    let from = state.current_state;

    if !topology_allows(from, to) {
        return Err(SafetyViolation::Topology { from, to });
    }

    if from != FailoverState::FailingOver {
        let elapsed = now.signed_duration_since(state.last_transition_time);
        if elapsed < params.min_time_in_state {
            return Err(SafetyViolation::MinTimeInState {
                elapsed,
                required: params.min_time_in_state,
            });
        }
    }

    if to == FailoverState::FailingOver {
        if let Some(last_failover) = state.last_failover_time {
            let since_last = now.signed_duration_since(last_failover);
            if since_last < params.failover_cooldown {
                return Err(SafetyViolation::FailoverCooldown {
                    since_last,
                    required: params.failover_cooldown,
                });
            }
        }

        if state.daily_failover_count >= params.max_daily_failovers {
            return Err(SafetyViolation::DailyCapReached {
                count: state.daily_failover_count,
                max: params.max_daily_failovers,
            });
        }

        if params.require_manual_auth {
            return Err(SafetyViolation::ManualAuthRequired);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateSeed;

    fn state_in(current: FailoverState) -> ControllerState {
        let mut state = ControllerState::default_from_seed(&StateSeed {
            primary_provider_id: "p".to_string(),
            secondary_provider_id: "s".to_string(),
            domain: "example.com".to_string(),
        });
        state.current_state = current;
        // Backdate far enough that the dwell guard never interferes unless a
        // test sets it up explicitly.
        state.last_transition_time = Utc::now() - Duration::hours(2);
        state
    }

    fn relaxed() -> SafetyParams {
        SafetyParams {
            min_time_in_state: Duration::zero(),
            ..SafetyParams::default()
        }
    }

    #[test]
    fn topology_accepts_the_lifecycle_edges() {
        use FailoverState::*;
        let params = relaxed();
        let now = Utc::now();
        for (from, to) in [
            (Healthy, Degraded),
            (Degraded, Healthy),
            (Degraded, FailingOver),
            (FailingOver, FailedOver),
            (FailingOver, Degraded),
            (FailedOver, Recovering),
            (Recovering, Healthy),
            (Recovering, FailedOver),
        ] {
            let state = state_in(from);
            assert!(
                validate_transition(&state, to, now, &params).is_ok(),
                "{} -> {} should be allowed",
                from,
                to
            );
        }
    }

    #[test]
    fn topology_rejects_everything_else() {
        use FailoverState::*;
        let params = relaxed();
        let now = Utc::now();
        for (from, to) in [
            (Healthy, FailingOver),
            (Healthy, FailedOver),
            (Healthy, Recovering),
            (Healthy, Healthy),
            (Degraded, FailedOver),
            (Degraded, Recovering),
            (FailingOver, Healthy),
            (FailingOver, Recovering),
            (FailedOver, Healthy),
            (FailedOver, Degraded),
            (FailedOver, FailingOver),
            (Recovering, Degraded),
            (Recovering, FailingOver),
        ] {
            let state = state_in(from);
            let err = validate_transition(&state, to, now, &params).unwrap_err();
            assert_eq!(err.kind(), "topology", "{} -> {} should be rejected", from, to);
        }
    }

    #[test]
    fn min_dwell_blocks_recent_transitions() {
        let mut state = state_in(FailoverState::Healthy);
        state.last_transition_time = Utc::now() - Duration::minutes(2);

        let err = validate_transition(
            &state,
            FailoverState::Degraded,
            Utc::now(),
            &SafetyParams::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "min_time_in_state");
    }

    #[test]
    fn dwell_is_exempt_when_leaving_failing_over() {
        // Entered FAILING_OVER seconds ago; it must still be able to finish.
        let mut state = state_in(FailoverState::FailingOver);
        state.last_transition_time = Utc::now();

        for to in [FailoverState::FailedOver, FailoverState::Degraded] {
            assert!(validate_transition(
                &state,
                to,
                Utc::now(),
                &SafetyParams::default()
            )
            .is_ok());
        }
    }

    #[test]
    fn cooldown_blocks_back_to_back_failovers() {
        let mut state = state_in(FailoverState::Degraded);
        state.last_failover_time = Some(Utc::now() - Duration::minutes(30));

        let err = validate_transition(
            &state,
            FailoverState::FailingOver,
            Utc::now(),
            &relaxed(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "failover_cooldown");
    }

    #[test]
    fn no_prior_failover_means_no_cooldown() {
        let mut state = state_in(FailoverState::Degraded);
        state.last_failover_time = None;

        assert!(validate_transition(
            &state,
            FailoverState::FailingOver,
            Utc::now(),
            &relaxed()
        )
        .is_ok());
    }

    #[test]
    fn daily_cap_blocks_at_limit() {
        let mut state = state_in(FailoverState::Degraded);
        state.daily_failover_count = 1;

        let err = validate_transition(
            &state,
            FailoverState::FailingOver,
            Utc::now(),
            &relaxed(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "daily_cap");
    }

    #[test]
    fn manual_auth_gate_rejects_failover_unconditionally() {
        let state = state_in(FailoverState::Degraded);
        let params = SafetyParams {
            min_time_in_state: Duration::zero(),
            require_manual_auth: true,
            ..SafetyParams::default()
        };

        let err =
            validate_transition(&state, FailoverState::FailingOver, Utc::now(), &params)
                .unwrap_err();
        assert_eq!(err.kind(), "manual_auth");
    }

    #[test]
    fn guards_only_apply_to_failover_entry() {
        // Cooldown and cap must not block, say, DEGRADED -> HEALTHY.
        let mut state = state_in(FailoverState::Degraded);
        state.last_failover_time = Some(Utc::now() - Duration::minutes(1));
        state.daily_failover_count = 5;

        assert!(validate_transition(
            &state,
            FailoverState::Healthy,
            Utc::now(),
            &relaxed()
        )
        .is_ok());
    }
}
