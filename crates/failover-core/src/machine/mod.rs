//! The failover state machine.
//!
//! [`StateMachine::evaluate`] is the periodic tick function: it loads the
//! persisted state, dispatches to the handler for the current state, and
//! persists any change. Handlers drive the lifecycle
//!
//! ```text
//! HEALTHY -> DEGRADED -> FAILING_OVER -> FAILED_OVER -> RECOVERING -> HEALTHY
//! ```
//!
//! with two abort edges: DEGRADED back to HEALTHY when the primary recovers
//! before confirmation, and FAILING_OVER back to DEGRADED when the registrar
//! rejects the update. Every transition passes through the safety validator;
//! a blocked transition leaves the persisted state untouched, so handler
//! mutations that were not explicitly saved are dropped and re-derived on
//! the next tick.
//!
//! The machine is biased toward inaction: on any read error it logs, skips
//! the tick, and stays in the current state. A missed failover is preferred
//! to a spurious one.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use crate::metrics;
use crate::safety::{validate_transition, SafetyParams};
use crate::state::{ControllerState, FailoverState, StateStore};
use crate::traits::{HealthStore, ProviderHealth, ProviderStore, Registrar};

/// Primary score below this in HEALTHY starts degradation tracking.
pub const DEGRADE_THRESHOLD: f64 = 0.5;

/// Consecutive degraded checks required before failover.
pub const CONSECUTIVE_DEGRADED_CHECKS_REQUIRED: u32 = 3;

/// Primary score above this in FAILED_OVER starts recovery.
pub const RECOVERY_THRESHOLD: f64 = 0.7;

/// Per-bucket score samples logged when a failover decision is made.
const HEALTH_HISTORY_SAMPLES: i64 = 10;

/// Lookback window for health score queries.
pub fn health_score_window() -> Duration {
    Duration::minutes(5)
}

/// The periodic failover evaluator.
pub struct StateMachine {
    health_store: Arc<dyn HealthStore>,
    provider_store: Arc<dyn ProviderStore>,
    registrar: Arc<dyn Registrar>,
    state_store: Arc<StateStore>,
    safety_params: SafetyParams,
}

impl StateMachine {
    /// Create a fully wired state machine with default safety parameters.
    pub fn new(
        health_store: Arc<dyn HealthStore>,
        provider_store: Arc<dyn ProviderStore>,
        registrar: Arc<dyn Registrar>,
        state_store: Arc<StateStore>,
    ) -> Self {
        Self {
            health_store,
            provider_store,
            registrar,
            state_store,
            safety_params: SafetyParams::default(),
        }
    }

    /// Override the safety parameters (tests, staged rollouts).
    pub fn with_safety_params(mut self, params: SafetyParams) -> Self {
        self.safety_params = params;
        self
    }

    /// One evaluation tick: load state, dispatch, persist changes.
    ///
    /// Never returns an error; failures are logged and the tick is skipped,
    /// leaving the persisted state as it was.
    pub async fn evaluate(&self) {
        let mut state = match self.state_store.load().await {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "failed to load controller state, skipping tick");
                return;
            }
        };

        let dwell = Utc::now().signed_duration_since(state.last_transition_time);
        info!(
            state = %state.current_state,
            dwell_secs = dwell.num_seconds(),
            "evaluating"
        );
        metrics::record_controller_state(state.current_state);

        match state.current_state {
            FailoverState::Healthy => self.handle_healthy(&mut state).await,
            FailoverState::Degraded => self.handle_degraded(&mut state).await,
            FailoverState::FailingOver => self.handle_failing_over(&mut state).await,
            FailoverState::FailedOver => self.handle_failed_over(&mut state).await,
            FailoverState::Recovering => self.handle_recovering(&mut state).await,
        }
    }

    /// HEALTHY: watch the primary's score and start degradation tracking
    /// when it drops below the degrade threshold.
    async fn handle_healthy(&self, state: &mut ControllerState) {
        let Some(scores) = self.fetch_scores("healthy").await else {
            return;
        };
        let Some(primary) = find_provider(&scores, &state.primary_provider_id) else {
            warn!(
                provider_id = %state.primary_provider_id,
                "primary provider missing from health scores"
            );
            return;
        };

        info!(
            provider = %primary.provider_name,
            score = primary.score,
            threshold = DEGRADE_THRESHOLD,
            "primary health"
        );

        if primary.score < DEGRADE_THRESHOLD {
            info!(
                score = primary.score,
                "primary below degrade threshold, transitioning to DEGRADED"
            );
            state.degraded_check_count = 1;
            self.transition(state, FailoverState::Degraded).await;
        }
    }

    /// DEGRADED: require the degradation to persist over consecutive checks
    /// before failing over; bounce back to HEALTHY on recovery.
    async fn handle_degraded(&self, state: &mut ControllerState) {
        let Some(scores) = self.fetch_scores("degraded").await else {
            return;
        };
        let Some(primary) = find_provider(&scores, &state.primary_provider_id) else {
            warn!(
                provider_id = %state.primary_provider_id,
                "primary provider missing from health scores"
            );
            return;
        };

        info!(
            score = primary.score,
            consecutive = state.degraded_check_count,
            required = CONSECUTIVE_DEGRADED_CHECKS_REQUIRED,
            "degradation check"
        );

        if primary.score >= DEGRADE_THRESHOLD {
            info!(score = primary.score, "primary recovered, returning to HEALTHY");
            state.degraded_check_count = 0;
            self.transition(state, FailoverState::Healthy).await;
            return;
        }

        state.degraded_check_count += 1;

        if state.degraded_check_count >= CONSECUTIVE_DEGRADED_CHECKS_REQUIRED {
            // Leave an evidence trail of the per-bucket scores that led to
            // this decision.
            match self
                .health_store
                .provider_health_history(&state.primary_provider_id, HEALTH_HISTORY_SAMPLES)
                .await
            {
                Ok(history) => info!(?history, "primary score history at failover decision"),
                Err(e) => warn!(error = %e, "could not fetch primary score history"),
            }

            info!(
                consecutive = state.degraded_check_count,
                "degradation confirmed, transitioning to FAILING_OVER"
            );
            self.transition(state, FailoverState::FailingOver).await;
            if state.current_state == FailoverState::FailingOver {
                // Degradation is confirmed; execute the failover in this
                // same tick rather than waiting out another interval.
                self.handle_failing_over(state).await;
            }
            return;
        }

        // Not yet confirmed. Persist the counter and wait for the next tick.
        if let Err(e) = self.state_store.save(state).await {
            error!(error = %e, "failed to save degraded check count");
        }
    }

    /// FAILING_OVER: execute the registrar update to the secondary provider.
    /// Any registrar failure before the update lands aborts back to
    /// DEGRADED; an unverified propagation does not.
    async fn handle_failing_over(&self, state: &mut ControllerState) {
        info!(domain = %state.domain, "executing failover");

        // Current delegation, for the audit log.
        let current_ns = match self.registrar.get_nameservers(&state.domain).await {
            Ok(ns) => ns,
            Err(e) => {
                error!(error = %e, "failed to read current nameservers, aborting failover");
                self.transition(state, FailoverState::Degraded).await;
                return;
            }
        };
        info!(?current_ns, "current registrar nameservers");

        let secondary_ns = match self
            .provider_store
            .nameservers(&state.secondary_provider_id)
            .await
        {
            Ok(ns) => ns,
            Err(e) => {
                error!(error = %e, "failed to resolve secondary nameservers, aborting failover");
                self.transition(state, FailoverState::Degraded).await;
                return;
            }
        };

        info!(?secondary_ns, "updating nameservers to secondary");
        if let Err(e) = self
            .registrar
            .update_nameservers(&state.domain, &secondary_ns)
            .await
        {
            error!(error = %e, "failed to update nameservers, aborting failover");
            self.transition(state, FailoverState::Degraded).await;
            return;
        }

        // The update has been sent; from here on the failover is committed.
        // Propagation is advisory -- the monitor observes the real effect.
        match self
            .registrar
            .verify_propagation(&state.domain, &secondary_ns)
            .await
        {
            Ok(true) => info!(domain = %state.domain, "propagation verified"),
            Ok(false) => warn!("propagation not yet confirmed, proceeding anyway"),
            Err(e) => warn!(error = %e, "propagation check failed, proceeding anyway"),
        }

        state.last_failover_time = Some(Utc::now());
        state.daily_failover_count += 1;
        state.degraded_check_count = 0;
        self.transition(state, FailoverState::FailedOver).await;

        info!(
            daily_count = state.daily_failover_count,
            max = self.safety_params.max_daily_failovers,
            "failover complete"
        );
    }

    /// FAILED_OVER: traffic is on the secondary; watch the primary for
    /// sustained recovery.
    async fn handle_failed_over(&self, state: &mut ControllerState) {
        let Some(scores) = self.fetch_scores("failed_over").await else {
            return;
        };
        let Some(primary) = find_provider(&scores, &state.primary_provider_id) else {
            warn!(
                provider_id = %state.primary_provider_id,
                "primary provider missing, staying in FAILED_OVER"
            );
            return;
        };

        if let Some(secondary) = find_provider(&scores, &state.secondary_provider_id) {
            info!(
                provider = %secondary.provider_name,
                score = secondary.score,
                "secondary health"
            );
        }

        info!(
            provider = %primary.provider_name,
            score = primary.score,
            threshold = RECOVERY_THRESHOLD,
            "primary health"
        );

        if primary.score > RECOVERY_THRESHOLD {
            info!(
                score = primary.score,
                "primary showing recovery, transitioning to RECOVERING"
            );
            state.recovery_start_time = Some(Utc::now());
            self.transition(state, FailoverState::Recovering).await;
        }
    }

    /// RECOVERING: hold until the primary has stayed healthy for the full
    /// recovery cooldown, then fail back. Degradation during the hold
    /// aborts back to FAILED_OVER.
    async fn handle_recovering(&self, state: &mut ControllerState) {
        let Some(scores) = self.fetch_scores("recovering").await else {
            return;
        };
        let Some(primary) = find_provider(&scores, &state.primary_provider_id) else {
            warn!("primary provider missing, aborting recovery");
            state.recovery_start_time = None;
            self.transition(state, FailoverState::FailedOver).await;
            return;
        };

        let now = Utc::now();
        let waited = state.recovery_start_time.map(|t| now.signed_duration_since(t));
        info!(
            score = primary.score,
            waited_secs = waited.map(|w| w.num_seconds()).unwrap_or(0),
            required_secs = self.safety_params.recovery_cooldown.num_seconds(),
            "recovery check"
        );

        if primary.score < DEGRADE_THRESHOLD {
            warn!(score = primary.score, "primary degraded again, aborting recovery");
            state.recovery_start_time = None;
            self.transition(state, FailoverState::FailedOver).await;
            return;
        }

        if let Some(waited) = waited {
            if waited < self.safety_params.recovery_cooldown {
                info!("still in recovery cooldown, waiting");
                return;
            }
        }

        // Cooldown elapsed and the primary is stable: fail back.
        info!(domain = %state.domain, "recovery cooldown complete, executing failback");

        let primary_ns = match self
            .provider_store
            .nameservers(&state.primary_provider_id)
            .await
        {
            Ok(ns) => ns,
            Err(e) => {
                // Unlike FAILING_OVER there is no better state to retreat
                // to; stay here and retry next tick.
                error!(error = %e, "failed to resolve primary nameservers, retrying next tick");
                return;
            }
        };

        if let Err(e) = self
            .registrar
            .update_nameservers(&state.domain, &primary_ns)
            .await
        {
            error!(error = %e, "failed to update nameservers for failback, retrying next tick");
            return;
        }

        match self
            .registrar
            .verify_propagation(&state.domain, &primary_ns)
            .await
        {
            Ok(true) => info!("failback propagation verified"),
            Ok(false) => warn!("failback propagation not yet confirmed, proceeding anyway"),
            Err(e) => warn!(error = %e, "failback propagation check failed, proceeding anyway"),
        }

        state.degraded_check_count = 0;
        state.recovery_start_time = None;
        self.transition(state, FailoverState::Healthy).await;
        info!("failback complete, system is HEALTHY");
    }

    /// Validate the state change, apply it, and persist.
    ///
    /// On a safety rejection the in-memory state is left as the handler
    /// mutated it but nothing is persisted, so the mutation evaporates at
    /// the next load. On a persistence failure after an accepted transition
    /// the in-memory change stands and the next tick re-evaluates from the
    /// stale file; the worst case is repeating the previous state's work,
    /// which every handler tolerates.
    async fn transition(&self, state: &mut ControllerState, to: FailoverState) {
        let now = Utc::now();

        if let Err(violation) = validate_transition(state, to, now, &self.safety_params) {
            warn!(
                from = %state.current_state,
                to = %to,
                reason = %violation,
                "transition blocked"
            );
            metrics::record_safety_block(violation.kind());
            return;
        }

        let from = state.current_state;
        state.current_state = to;
        state.last_transition_time = now;

        if let Err(e) = self.state_store.save(state).await {
            error!(error = %e, from = %from, to = %to, "failed to persist state after transition");
            return;
        }

        info!(from = %from, to = %to, "transition");
        metrics::record_transition(from, to);
        metrics::record_controller_state(to);
    }

    /// Fetch the windowed health scores, logging and skipping the tick on
    /// storage errors.
    async fn fetch_scores(&self, context: &str) -> Option<Vec<ProviderHealth>> {
        match self
            .health_store
            .provider_health_scores(health_score_window())
            .await
        {
            Ok(scores) => Some(scores),
            Err(e) => {
                error!(context, error = %e, "failed to fetch health scores, skipping tick");
                None
            }
        }
    }
}

/// The health entry for the given provider id, if present.
fn find_provider<'a>(scores: &'a [ProviderHealth], provider_id: &str) -> Option<&'a ProviderHealth> {
    scores.iter().find(|p| p.provider_id == provider_id)
}
