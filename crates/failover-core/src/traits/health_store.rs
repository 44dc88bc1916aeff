// # Health Store Trait
//
// Read-only aggregation over the probe results table. The state machine is
// decoupled from the storage implementation through this trait so scenario
// tests can script score sequences.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;

/// Computed health score and metadata for one DNS provider.
///
/// Derived from probe results on every query; never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderHealth {
    pub provider_id: String,
    pub provider_name: String,
    /// Composite score, 0.0 to 1.0.
    pub score: f64,
    /// Number of probe results inside the scoring window.
    pub check_count: i64,
    /// Timestamp of the most recent probe, if any.
    pub last_check: Option<DateTime<Utc>>,
}

/// Read side of the health results table.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Current health score for every active provider, computed over the
    /// given lookback window. Providers with no recent results are still
    /// returned (with zero `check_count` and the score floor).
    async fn provider_health_scores(&self, window: Duration) -> Result<Vec<ProviderHealth>>;

    /// The most recent `count` per-bucket scores for one provider, bucketed
    /// into 30-second wall-clock windows, newest first, normalized to
    /// 0.0-1.0.
    async fn provider_health_history(&self, provider_id: &str, count: i64) -> Result<Vec<f64>>;
}
