//! Test doubles and common utilities for the state machine contract tests.
//!
//! The doubles let scenarios script the health score sequence tick by tick
//! and observe exactly which registrar operations the machine performed.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use failover_core::error::{Error, Result};
use failover_core::safety::SafetyParams;
use failover_core::state::{StateSeed, StateStore};
use failover_core::traits::{
    HealthStore, Provider, ProviderHealth, ProviderStore, Registrar,
};
use failover_core::StateMachine;

pub const PRIMARY_ID: &str = "prov-primary";
pub const SECONDARY_ID: &str = "prov-secondary";
pub const DOMAIN: &str = "example.com";

pub fn primary_ns() -> Vec<String> {
    vec![
        "ns1.primary-dns.net".to_string(),
        "ns2.primary-dns.net".to_string(),
    ]
}

pub fn secondary_ns() -> Vec<String> {
    vec![
        "ns1.secondary-dns.net".to_string(),
        "ns2.secondary-dns.net".to_string(),
    ]
}

/// A health store that serves a scripted sequence of score ticks.
///
/// Each call to `provider_health_scores` consumes the next scripted tick;
/// when the script runs out, the last tick repeats.
#[derive(Default)]
pub struct ScriptedHealthStore {
    ticks: Mutex<VecDeque<Vec<ProviderHealth>>>,
    last: Mutex<Vec<ProviderHealth>>,
    score_calls: AtomicUsize,
}

impl ScriptedHealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one tick's worth of `(provider_id, score)` pairs.
    pub fn push_tick(&self, scores: &[(&str, f64)]) {
        let tick = scores
            .iter()
            .map(|(id, score)| ProviderHealth {
                provider_id: id.to_string(),
                provider_name: format!("{}-name", id),
                score: *score,
                check_count: 10,
                last_check: Some(Utc::now()),
            })
            .collect();
        self.ticks.lock().unwrap().push_back(tick);
    }

    pub fn score_call_count(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthStore for ScriptedHealthStore {
    async fn provider_health_scores(&self, _window: Duration) -> Result<Vec<ProviderHealth>> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        let mut ticks = self.ticks.lock().unwrap();
        match ticks.pop_front() {
            Some(tick) => {
                *self.last.lock().unwrap() = tick.clone();
                Ok(tick)
            }
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }

    async fn provider_health_history(&self, _provider_id: &str, _count: i64) -> Result<Vec<f64>> {
        Ok(Vec::new())
    }
}

/// A fixed provider roster with known nameservers per provider.
pub struct StaticProviderStore {
    providers: HashMap<String, Provider>,
}

impl StaticProviderStore {
    /// Primary and secondary providers with their conventional nameservers.
    pub fn with_defaults() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            PRIMARY_ID.to_string(),
            Provider {
                id: PRIMARY_ID.to_string(),
                name: "primary-dns".to_string(),
                health_check_endpoints: primary_ns(),
            },
        );
        providers.insert(
            SECONDARY_ID.to_string(),
            Provider {
                id: SECONDARY_ID.to_string(),
                name: "secondary-dns".to_string(),
                health_check_endpoints: secondary_ns(),
            },
        );
        Self { providers }
    }
}

#[async_trait]
impl ProviderStore for StaticProviderStore {
    async fn active_providers(&self) -> Result<Vec<Provider>> {
        Ok(self.providers.values().cloned().collect())
    }

    async fn nameservers(&self, provider_id: &str) -> Result<Vec<String>> {
        self.providers
            .get(provider_id)
            .map(|p| p.health_check_endpoints.clone())
            .ok_or_else(|| Error::store(format!("unknown provider {}", provider_id)))
    }
}

/// A registrar double that records every call and can be instructed to fail
/// any of the three operations.
#[derive(Default)]
pub struct InstrumentedRegistrar {
    fail_get: AtomicBool,
    fail_update: AtomicBool,
    verify_ok: AtomicBool,
    get_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    updates: Mutex<Vec<(String, Vec<String>)>>,
}

impl InstrumentedRegistrar {
    pub fn new() -> Self {
        let registrar = Self::default();
        registrar.verify_ok.store(true, Ordering::SeqCst);
        registrar
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn set_verify_ok(&self, ok: bool) {
        self.verify_ok.store(ok, Ordering::SeqCst);
    }

    pub fn get_call_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn verify_call_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn update_call_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    /// All `(domain, nameservers)` pairs passed to `update_nameservers`.
    pub fn updates(&self) -> Vec<(String, Vec<String>)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl Registrar for InstrumentedRegistrar {
    async fn get_nameservers(&self, _domain: &str) -> Result<Vec<String>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Error::registrar("test", "get_nameservers failed"));
        }
        Ok(primary_ns())
    }

    async fn update_nameservers(&self, domain: &str, nameservers: &[String]) -> Result<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(Error::registrar("test", "update_nameservers failed"));
        }
        self.updates
            .lock()
            .unwrap()
            .push((domain.to_string(), nameservers.to_vec()));
        Ok(())
    }

    async fn verify_propagation(&self, _domain: &str, _expected: &[String]) -> Result<bool> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verify_ok.load(Ordering::SeqCst))
    }

    fn name(&self) -> &'static str {
        "instrumented"
    }
}

pub fn seed() -> StateSeed {
    StateSeed {
        primary_provider_id: PRIMARY_ID.to_string(),
        secondary_provider_id: SECONDARY_ID.to_string(),
        domain: DOMAIN.to_string(),
    }
}

/// Safety parameters with the dwell guard disabled, as the end-to-end
/// scenarios prescribe. Cooldown, daily cap, and recovery cooldown keep
/// their production defaults.
pub fn relaxed_safety() -> SafetyParams {
    SafetyParams {
        min_time_in_state: Duration::zero(),
        ..SafetyParams::default()
    }
}

/// A machine wired with scripted scores, default providers, and an
/// instrumented registrar over a state file in `dir`.
pub struct Harness {
    pub machine: StateMachine,
    pub scores: Arc<ScriptedHealthStore>,
    pub registrar: Arc<InstrumentedRegistrar>,
    pub state_store: Arc<StateStore>,
}

pub async fn harness(dir: &std::path::Path) -> Harness {
    harness_with_safety(dir, relaxed_safety()).await
}

pub async fn harness_with_safety(dir: &std::path::Path, safety: SafetyParams) -> Harness {
    let scores = Arc::new(ScriptedHealthStore::new());
    let registrar = Arc::new(InstrumentedRegistrar::new());
    let state_store = Arc::new(
        StateStore::new(dir.join("state.json"), seed())
            .await
            .expect("state store construction succeeds"),
    );

    let machine = StateMachine::new(
        scores.clone(),
        Arc::new(StaticProviderStore::with_defaults()),
        registrar.clone(),
        state_store.clone(),
    )
    .with_safety_params(safety);

    Harness {
        machine,
        scores,
        registrar,
        state_store,
    }
}
