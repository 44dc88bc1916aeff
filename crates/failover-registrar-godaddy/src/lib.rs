// # GoDaddy Registrar Client
//
// Real `Registrar` implementation over the GoDaddy domains API.
//
// - Read delegation:   GET  /v1/domains/{domain}   -> `nameServers` field
// - Write delegation:  PATCH /v1/domains/{domain}  with `{"nameServers": [...]}`
// - Auth:              `Authorization: sso-key <key>:<secret>`
//
// The client is single-shot: one API call per operation, full error
// propagation. Retry policy is owned by the state machine (abort to
// DEGRADED during failover, stay-and-retry during failback).
//
// Propagation verification does not touch the GoDaddy API at all: it asks
// the public resolvers 8.8.8.8 and 1.1.1.1 for the domain's NS records and
// requires every resolver to report exactly the expected set.
//
// ## Security
//
// The API key and secret never appear in logs; the Debug implementation
// redacts them.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use failover_core::error::{Error, Result};
use failover_core::traits::Registrar;

/// GoDaddy production API base URL.
const GODADDY_API_BASE: &str = "https://api.godaddy.com";

/// HTTP timeout for registrar API requests.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for each propagation NS lookup.
const PROPAGATION_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Public resolvers queried for propagation verification.
const PUBLIC_RESOLVERS: &[&str] = &["8.8.8.8:53", "1.1.1.1:53"];

/// GoDaddy domains API client.
pub struct GoDaddyRegistrar {
    api_key: String,
    api_secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GoDaddyRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoDaddyRegistrar")
            .field("api_key", &"<REDACTED>")
            .field("api_secret", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GoDaddyRegistrar {
    /// Create a client against the production API.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, api_secret, GODADDY_API_BASE)
    }

    /// Create a client against a custom base URL (OTE environment, tests).
    pub fn with_base_url(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        let api_secret = api_secret.into();
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(Error::config("GoDaddy API key and secret are required"));
        }

        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::registrar("godaddy", format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            api_secret,
            base_url: base_url.into(),
            client,
        })
    }

    fn auth_header(&self) -> String {
        format!("sso-key {}:{}", self.api_key, self.api_secret)
    }

    fn domain_url(&self, domain: &str) -> String {
        format!("{}/v1/domains/{}", self.base_url, domain)
    }
}

#[async_trait]
impl Registrar for GoDaddyRegistrar {
    async fn get_nameservers(&self, domain: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.domain_url(domain))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| Error::registrar("godaddy", format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(api_error("read domain", response.status(), response.text().await.ok()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::registrar("godaddy", format!("failed to parse response: {}", e)))?;

        parse_nameservers(&body)
    }

    async fn update_nameservers(&self, domain: &str, nameservers: &[String]) -> Result<()> {
        tracing::info!(domain, ?nameservers, "updating nameservers at GoDaddy");

        let payload = serde_json::json!({ "nameServers": nameservers });
        let response = self
            .client
            .patch(self.domain_url(domain))
            .header("Authorization", self.auth_header())
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::registrar("godaddy", format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(api_error(
                "update nameservers",
                response.status(),
                response.text().await.ok(),
            ));
        }

        tracing::info!(domain, "nameserver update accepted");
        Ok(())
    }

    async fn verify_propagation(&self, domain: &str, expected: &[String]) -> Result<bool> {
        let want = normalized_set(expected);

        for resolver in PUBLIC_RESOLVERS {
            let reported =
                failover_dns::lookup_ns(resolver, domain, PROPAGATION_LOOKUP_TIMEOUT).await?;
            let got = normalized_set(&reported);

            if got != want {
                tracing::info!(
                    domain,
                    resolver,
                    ?reported,
                    ?expected,
                    "resolver does not yet report expected nameservers"
                );
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn name(&self) -> &'static str {
        "godaddy"
    }
}

/// Extract the `nameServers` list from a GoDaddy domain response body.
fn parse_nameservers(body: &Value) -> Result<Vec<String>> {
    let nameservers = body["nameServers"]
        .as_array()
        .ok_or_else(|| Error::registrar("godaddy", "response has no nameServers array"))?;

    let parsed: Vec<String> = nameservers
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect();

    if parsed.is_empty() {
        return Err(Error::registrar("godaddy", "domain has no nameservers"));
    }
    Ok(parsed)
}

/// Normalized, order-independent NS set for comparison.
fn normalized_set(nameservers: &[String]) -> std::collections::BTreeSet<String> {
    nameservers
        .iter()
        .map(|ns| failover_dns::normalize_ns_name(ns))
        .collect()
}

fn api_error(operation: &str, status: reqwest::StatusCode, body: Option<String>) -> Error {
    let body = body.unwrap_or_else(|| "<unreadable body>".to_string());
    let message = match status.as_u16() {
        401 | 403 => format!(
            "{} failed: authentication rejected (status {})",
            operation, status
        ),
        404 => format!("{} failed: domain not found (status {})", operation, status),
        429 => format!("{} failed: rate limited (status {})", operation, status),
        500..=599 => format!(
            "{} failed: server error (status {}): {}",
            operation, status, body
        ),
        _ => format!("{} failed: status {}: {}", operation, status, body),
    };
    Error::registrar("godaddy", message)
}
