// # Registrar Trait
//
// Defines the interface to the domain registrar. The controller uses this
// to read and rewrite the domain's NS delegation -- the core failover and
// failback operation.
//
// ## Implementations
//
// - Mock: `crate::registrar::MockRegistrar` (default; logs and succeeds)
// - GoDaddy: `failover-registrar-godaddy` crate
//
// Implementations make single-shot API calls and propagate errors; retry
// policy is owned by the state machine (stay in state, retry next tick).

use async_trait::async_trait;

use crate::error::Result;

/// Interface to the domain registrar's nameserver management API.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Return the nameservers currently delegated for the domain.
    async fn get_nameservers(&self, domain: &str) -> Result<Vec<String>>;

    /// Replace the domain's nameserver delegation with the given list.
    ///
    /// This is the operation that moves live traffic between providers.
    /// It must be idempotent: setting the same list twice is safe.
    async fn update_nameservers(&self, domain: &str, nameservers: &[String]) -> Result<()>;

    /// Check whether public resolvers already report the expected NS set.
    ///
    /// Returns `Ok(true)` only when every queried resolver agrees. A `false`
    /// or an error is advisory: the caller proceeds and lets monitoring
    /// observe the real effect.
    async fn verify_propagation(&self, domain: &str, expected: &[String]) -> Result<bool>;

    /// Short implementation name for logging.
    fn name(&self) -> &'static str;
}
