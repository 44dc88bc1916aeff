// # Nameserver Probe Trait
//
// One health probe against one nameserver endpoint. The wire implementation
// (hickory-proto over UDP) lives in the `failover-dns` crate.

use std::time::Duration;

use async_trait::async_trait;

/// Outcome of a single probe.
///
/// A probe is successful iff the transport completed and the response code
/// was NOERROR. Everything else -- timeouts, refused connections, malformed
/// responses, NXDOMAIN, SERVFAIL, REFUSED -- is a failure, with the cause
/// named in `error`.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub success: bool,
    /// Wall-clock round trip, including failed attempts up to the timeout.
    pub latency: Duration,
    /// Transport error message or RCODE name; `None` on success.
    pub error: Option<String>,
}

/// A DNS health probe against a single nameserver endpoint.
#[async_trait]
pub trait NameserverProbe: Send + Sync {
    /// Probe `endpoint` (a `host[:port]` string; port defaults to 53) with a
    /// TXT query for `domain`. Never returns an error: failures are encoded
    /// in the outcome.
    async fn probe(&self, endpoint: &str, domain: &str) -> ProbeOutcome;
}
