// # failover-store-postgres
//
// Postgres-backed implementations of the store traits, all over one
// connection pool:
//
// - `ProviderStore`: the `dns_providers` roster (monitor reads endpoints,
//   controller resolves a provider's nameservers for registrar updates)
// - `ResultStore`: appends to `health_check_results`
// - `HealthStore`: the windowed score aggregation and the 30-second-bucket
//   score history
//
// The schema is owned by the provisioning layer, not this crate, so all
// queries are runtime-checked and numeric aggregates are cast to float8
// explicitly.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use failover_core::error::{Error, Result};
use failover_core::score;
use failover_core::traits::{
    HealthResult, HealthStore, Provider, ProviderHealth, ProviderStore, ResultStore,
};

/// Shared Postgres store. Clone freely; the pool is internally shared.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with pool settings sized for one-query-per-tick control
    /// loops.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| Error::store(format!("failed to connect to database: {}", e)))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, shared wiring).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderStore for PgStore {
    async fn active_providers(&self) -> Result<Vec<Provider>> {
        let rows = sqlx::query(
            "SELECT id::text AS id, name, health_check_endpoints \
             FROM dns_providers WHERE status != 'failed'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::store(format!("query providers: {}", e)))?;

        let mut providers = Vec::with_capacity(rows.len());
        for row in rows {
            let endpoints_json: serde_json::Value = row
                .try_get("health_check_endpoints")
                .map_err(|e| Error::store(format!("read provider endpoints: {}", e)))?;
            let health_check_endpoints: Vec<String> = serde_json::from_value(endpoints_json)
                .map_err(|e| Error::store(format!("parse provider endpoints: {}", e)))?;

            providers.push(Provider {
                id: row
                    .try_get("id")
                    .map_err(|e| Error::store(format!("read provider id: {}", e)))?,
                name: row
                    .try_get("name")
                    .map_err(|e| Error::store(format!("read provider name: {}", e)))?,
                health_check_endpoints,
            });
        }
        Ok(providers)
    }

    async fn nameservers(&self, provider_id: &str) -> Result<Vec<String>> {
        let row = sqlx::query(
            "SELECT health_check_endpoints FROM dns_providers WHERE id::text = $1",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::store(format!("query provider nameservers: {}", e)))?
        .ok_or_else(|| Error::store(format!("unknown provider {}", provider_id)))?;

        let endpoints_json: serde_json::Value = row
            .try_get("health_check_endpoints")
            .map_err(|e| Error::store(format!("read provider endpoints: {}", e)))?;
        let endpoints: Vec<String> = serde_json::from_value(endpoints_json)
            .map_err(|e| Error::store(format!("parse provider endpoints: {}", e)))?;

        let nameservers: Vec<String> = endpoints.iter().map(|e| strip_port(e)).collect();
        if nameservers.is_empty() {
            return Err(Error::store(format!(
                "provider {} has no nameservers configured",
                provider_id
            )));
        }
        Ok(nameservers)
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn record(&self, result: &HealthResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO health_check_results \
             (provider_id, nameserver_address, query_domain, response_time_ms, \
              success, error_message, check_location, check_timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&result.provider_id)
        .bind(&result.nameserver)
        .bind(&result.query_domain)
        .bind(result.latency_ms as i32)
        .bind(result.success)
        .bind(result.error.clone().unwrap_or_default())
        .bind(&result.check_location)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::store(format!("insert health result: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl HealthStore for PgStore {
    /// Compute a health score for every active provider over the lookback
    /// window.
    ///
    /// The LEFT JOIN keeps providers with zero recent checks in the result
    /// set: they get a zero success rate and the 1000 ms latency fallback,
    /// which lands them on the score floor.
    async fn provider_health_scores(&self, window: Duration) -> Result<Vec<ProviderHealth>> {
        let cutoff: DateTime<Utc> = Utc::now() - window;

        let rows = sqlx::query(
            "SELECT \
                 p.id::text AS id, \
                 p.name, \
                 COUNT(r.id) AS check_count, \
                 MAX(r.check_timestamp) AS last_check, \
                 COALESCE(AVG(CASE WHEN r.success THEN 1.0 ELSE 0.0 END), 0)::float8 AS success_rate, \
                 COALESCE(AVG(CASE WHEN r.success THEN r.response_time_ms ELSE NULL END), 1000)::float8 AS avg_latency_ms \
             FROM dns_providers p \
             LEFT JOIN health_check_results r \
                 ON r.provider_id = p.id \
                 AND r.check_timestamp > $1 \
             WHERE p.status != 'failed' \
             GROUP BY p.id, p.name",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::store(format!("query provider health scores: {}", e)))?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let success_rate: f64 = row
                .try_get("success_rate")
                .map_err(|e| Error::store(format!("read success rate: {}", e)))?;
            let avg_latency_ms: f64 = row
                .try_get("avg_latency_ms")
                .map_err(|e| Error::store(format!("read avg latency: {}", e)))?;

            results.push(ProviderHealth {
                provider_id: row
                    .try_get("id")
                    .map_err(|e| Error::store(format!("read provider id: {}", e)))?,
                provider_name: row
                    .try_get("name")
                    .map_err(|e| Error::store(format!("read provider name: {}", e)))?,
                score: score::composite_score(success_rate, avg_latency_ms),
                check_count: row
                    .try_get("check_count")
                    .map_err(|e| Error::store(format!("read check count: {}", e)))?,
                last_check: row
                    .try_get("last_check")
                    .map_err(|e| Error::store(format!("read last check: {}", e)))?,
            });
        }
        Ok(results)
    }

    /// The most recent `count` per-bucket scores for one provider.
    ///
    /// Results are bucketed into 30-second wall-clock windows (matching the
    /// probe interval), scored with the shared formula, newest first.
    async fn provider_health_history(&self, provider_id: &str, count: i64) -> Result<Vec<f64>> {
        let rows = sqlx::query(
            "WITH bucketed AS ( \
                 SELECT \
                     date_trunc('minute', check_timestamp) + \
                         (EXTRACT(SECOND FROM check_timestamp)::int / 30) * interval '30 seconds' AS bucket, \
                     AVG(CASE WHEN success THEN 1.0 ELSE 0.0 END)::float8 AS success_rate, \
                     COALESCE(AVG(CASE WHEN success THEN response_time_ms ELSE NULL END), 1000)::float8 AS avg_latency_ms \
                 FROM health_check_results \
                 WHERE provider_id = $1 \
                 GROUP BY bucket \
                 ORDER BY bucket DESC \
                 LIMIT $2 \
             ) \
             SELECT success_rate, avg_latency_ms FROM bucketed ORDER BY bucket DESC",
        )
        .bind(provider_id)
        .bind(count)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::store(format!("query provider health history: {}", e)))?;

        let mut scores = Vec::with_capacity(rows.len());
        for row in rows {
            let success_rate: f64 = row
                .try_get("success_rate")
                .map_err(|e| Error::store(format!("read success rate: {}", e)))?;
            let avg_latency_ms: f64 = row
                .try_get("avg_latency_ms")
                .map_err(|e| Error::store(format!("read avg latency: {}", e)))?;
            scores.push(score::composite_score(success_rate, avg_latency_ms));
        }
        Ok(scores)
    }
}

/// Strip a `:port` suffix from a probe endpoint, leaving the nameserver
/// host. Bare IPv6 literals pass through untouched.
fn strip_port(endpoint: &str) -> String {
    if let Ok(addr) = endpoint.parse::<std::net::SocketAddr>() {
        return addr.ip().to_string();
    }
    match endpoint.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty()
                && !host.contains(':')
                && !port.is_empty()
                && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            host.to_string()
        }
        _ => endpoint.to_string(),
    }
}
