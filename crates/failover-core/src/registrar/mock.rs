// # Mock Registrar
//
// Development and test default. Logs every operation, tracks the NS set it
// was last given per domain, and always succeeds. Select a real registrar
// with the REGISTRAR_TYPE environment variable in the daemon.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::traits::Registrar;

/// Logging registrar that performs no real API calls.
#[derive(Debug, Default)]
pub struct MockRegistrar {
    /// What the mock believes each domain's nameservers are, so tests and
    /// local runs can observe the sequence of updates.
    current_ns: Mutex<HashMap<String, Vec<String>>>,
}

impl MockRegistrar {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registrar for MockRegistrar {
    async fn get_nameservers(&self, domain: &str) -> Result<Vec<String>> {
        tracing::info!(domain, "mock registrar: get nameservers");
        let current = self.current_ns.lock().await;
        if let Some(ns) = current.get(domain) {
            return Ok(ns.clone());
        }
        // Default: a typical dual-provider delegation.
        Ok(vec![
            "ns1.primary-provider.com".to_string(),
            "ns2.primary-provider.com".to_string(),
        ])
    }

    async fn update_nameservers(&self, domain: &str, nameservers: &[String]) -> Result<()> {
        tracing::info!(domain, ?nameservers, "mock registrar: update nameservers");
        self.current_ns
            .lock()
            .await
            .insert(domain.to_string(), nameservers.to_vec());
        Ok(())
    }

    async fn verify_propagation(&self, domain: &str, expected: &[String]) -> Result<bool> {
        tracing::info!(domain, ?expected, "mock registrar: verify propagation");
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_is_visible_to_subsequent_get() {
        let registrar = MockRegistrar::new();
        let ns = vec!["ns1.backup.net".to_string(), "ns2.backup.net".to_string()];

        registrar
            .update_nameservers("example.com", &ns)
            .await
            .unwrap();

        assert_eq!(registrar.get_nameservers("example.com").await.unwrap(), ns);
        assert!(registrar
            .verify_propagation("example.com", &ns)
            .await
            .unwrap());
    }
}
