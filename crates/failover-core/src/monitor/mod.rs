//! The probe engine.
//!
//! Every tick, [`Monitor::run_checks`] fans out one task per active
//! provider. Each task probes the provider's nameserver endpoints
//! sequentially, appends one result row per probe, and publishes the live
//! health gauge. Tasks are independent and are not awaited: a slow provider
//! must not delay the others, and a tick overlapping the next one is
//! acceptable (each probe is bounded by the 5 s DNS timeout).

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::metrics;
use crate::score;
use crate::traits::{HealthResult, NameserverProbe, Provider, ProviderStore, ResultStore};

/// Sentinel domain queried by every health probe.
pub const QUERY_DOMAIN: &str = "_health-check.example.com";

/// The periodic probe engine.
#[derive(Clone)]
pub struct Monitor {
    provider_store: Arc<dyn ProviderStore>,
    result_store: Arc<dyn ResultStore>,
    probe: Arc<dyn NameserverProbe>,
    check_location: String,
}

impl Monitor {
    pub fn new(
        provider_store: Arc<dyn ProviderStore>,
        result_store: Arc<dyn ResultStore>,
        probe: Arc<dyn NameserverProbe>,
        check_location: impl Into<String>,
    ) -> Self {
        Self {
            provider_store,
            result_store,
            probe,
            check_location: check_location.into(),
        }
    }

    /// One monitoring tick: enumerate active providers and spawn an
    /// independent check task per provider.
    pub async fn run_checks(&self) {
        let providers = match self.provider_store.active_providers().await {
            Ok(providers) => providers,
            Err(e) => {
                error!(error = %e, "failed to fetch providers, skipping tick");
                return;
            }
        };

        for provider in providers {
            let monitor = self.clone();
            tokio::spawn(async move {
                monitor.check_provider(provider).await;
            });
        }
    }

    /// Probe every endpoint of one provider sequentially and publish its
    /// live health score.
    async fn check_provider(&self, provider: Provider) {
        let mut success_count = 0u32;
        let mut total_checks = 0u32;
        let mut total_latency = Duration::ZERO;

        for endpoint in &provider.health_check_endpoints {
            let outcome = self.probe.probe(endpoint, QUERY_DOMAIN).await;

            total_checks += 1;
            if outcome.success {
                success_count += 1;
            }
            total_latency += outcome.latency;

            let result = HealthResult {
                provider_id: provider.id.clone(),
                nameserver: endpoint.clone(),
                query_domain: QUERY_DOMAIN.to_string(),
                latency_ms: outcome.latency.as_millis() as i64,
                success: outcome.success,
                error: outcome.error.clone(),
                check_location: self.check_location.clone(),
            };
            if let Err(e) = self.result_store.record(&result).await {
                error!(error = %e, nameserver = %endpoint, "failed to record probe result");
            }

            metrics::record_probe(&provider.name, endpoint, outcome.success, outcome.latency);
        }

        if total_checks > 0 {
            let success_rate = f64::from(success_count) / f64::from(total_checks);
            let avg_latency_ms = total_latency.as_millis() as f64 / f64::from(total_checks);
            let live_score = score::composite_score_0_100(success_rate, avg_latency_ms);

            metrics::record_provider_health_score(&provider.name, live_score);
            info!(provider = %provider.name, score = live_score, "provider health score");
        }
    }
}
