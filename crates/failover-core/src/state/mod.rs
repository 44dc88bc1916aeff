//! Persisted controller state.
//!
//! The state machine's entire memory is one [`ControllerState`] snapshot,
//! written to disk as JSON after every mutation so the controller resumes
//! from the correct state after a restart.

mod file;

pub use file::StateStore;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// The failover lifecycle states.
///
/// Serialized as the literal uppercase tokens in the state file. The enum is
/// closed: a state file carrying any other token fails deserialization and
/// the store falls back to the default HEALTHY state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailoverState {
    /// Primary provider healthy, traffic on primary.
    #[serde(rename = "HEALTHY")]
    Healthy,
    /// Primary score below the degrade threshold; confirming over
    /// consecutive checks before acting.
    #[serde(rename = "DEGRADED")]
    Degraded,
    /// Degradation confirmed; the registrar update to the secondary is in
    /// flight. Transient.
    #[serde(rename = "FAILING_OVER")]
    FailingOver,
    /// Traffic on the secondary provider; watching the primary for recovery.
    #[serde(rename = "FAILED_OVER")]
    FailedOver,
    /// Primary recovering; waiting out the recovery cooldown before
    /// failing back.
    #[serde(rename = "RECOVERING")]
    Recovering,
}

impl FailoverState {
    /// The literal token used in the state file and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverState::Healthy => "HEALTHY",
            FailoverState::Degraded => "DEGRADED",
            FailoverState::FailingOver => "FAILING_OVER",
            FailoverState::FailedOver => "FAILED_OVER",
            FailoverState::Recovering => "RECOVERING",
        }
    }
}

impl std::fmt::Display for FailoverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted snapshot of the state machine.
///
/// Mutated only by the state machine and persisted after every mutation.
/// Absent timestamps (`last_failover_time` before any failover,
/// `recovery_start_time` outside RECOVERING) are `None`/`null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerState {
    pub current_state: FailoverState,
    pub primary_provider_id: String,
    pub secondary_provider_id: String,
    pub domain: String,
    pub last_transition_time: DateTime<Utc>,
    pub last_failover_time: Option<DateTime<Utc>>,
    pub daily_failover_count: u32,
    /// Day-of-year the daily counter was last reset on.
    pub daily_failover_reset_day: u32,
    /// Consecutive degraded observations; non-zero only in DEGRADED.
    pub degraded_check_count: u32,
    pub recovery_start_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Seed values for the default state, read from the environment by the
/// daemon on first run.
#[derive(Debug, Clone, Default)]
pub struct StateSeed {
    pub primary_provider_id: String,
    pub secondary_provider_id: String,
    pub domain: String,
}

impl ControllerState {
    /// Build the default HEALTHY state from seed values.
    pub fn default_from_seed(seed: &StateSeed) -> Self {
        let now = Utc::now();
        Self {
            current_state: FailoverState::Healthy,
            primary_provider_id: seed.primary_provider_id.clone(),
            secondary_provider_id: seed.secondary_provider_id.clone(),
            domain: seed.domain.clone(),
            last_transition_time: now,
            last_failover_time: None,
            daily_failover_count: 0,
            daily_failover_reset_day: now.ordinal(),
            degraded_check_count: 0,
            recovery_start_time: None,
            updated_at: now,
        }
    }
}
