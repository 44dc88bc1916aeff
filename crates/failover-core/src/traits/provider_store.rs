// # Provider and Result Store Traits
//
// The monitor reads the provider roster and appends probe results; the
// controller resolves provider nameservers for registrar updates. Both go
// through these traits so the Postgres implementation stays in its own
// crate.

use async_trait::async_trait;

use crate::error::Result;

/// A DNS provider row. Externally managed; read-only to this system.
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    pub id: String,
    pub name: String,
    /// Ordered `host[:port]` endpoints probed by the monitor. For a DNS
    /// hosting provider these are its authoritative nameservers.
    pub health_check_endpoints: Vec<String>,
}

/// One probe observation, appended by the monitor.
#[derive(Debug, Clone)]
pub struct HealthResult {
    pub provider_id: String,
    pub nameserver: String,
    pub query_domain: String,
    pub latency_ms: i64,
    pub success: bool,
    /// Transport error message or RCODE name; `None` on success.
    pub error: Option<String>,
    pub check_location: String,
}

/// Read side of the provider roster.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// All providers whose status is not `failed`.
    async fn active_providers(&self) -> Result<Vec<Provider>>;

    /// The provider's nameserver host names: its health-check endpoints with
    /// any `:port` suffix stripped. Errors if the provider is unknown or has
    /// no endpoints configured.
    async fn nameservers(&self, provider_id: &str) -> Result<Vec<String>>;
}

/// Append side of the probe results table.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Append one probe result row, stamped with the current time.
    async fn record(&self, result: &HealthResult) -> Result<()>;
}
