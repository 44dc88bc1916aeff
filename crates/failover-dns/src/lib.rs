// # failover-dns
//
// DNS wire plumbing for the failover control plane, built on hickory-proto
// over plain tokio UDP sockets.
//
// Two operations live here:
//
// - `DnsProber`: the monitor's health probe -- a non-recursive TXT query
//   against one authoritative nameserver endpoint.
// - `lookup_ns`: an NS query against a public recursive resolver, used by
//   registrar implementations to verify delegation propagation.
//
// Probes never return an error: every failure mode (timeout, refused
// connect, malformed response, non-NOERROR rcode) is folded into the
// outcome so the monitor records it as a failed check with a cause.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant, UNIX_EPOCH};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use tokio::net::UdpSocket;

use failover_core::error::{Error, Result};
use failover_core::traits::{NameserverProbe, ProbeOutcome};

/// Default DNS query timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum UDP response size we accept (EDNS-sized).
const MAX_RESPONSE_SIZE: usize = 4096;

/// Health prober issuing non-recursive TXT queries over UDP.
#[derive(Debug, Clone)]
pub struct DnsProber {
    timeout: Duration,
}

impl DnsProber {
    /// Prober with the standard 5 s timeout.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Prober with a custom timeout (tests, aggressive deployments).
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for DnsProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NameserverProbe for DnsProber {
    async fn probe(&self, endpoint: &str, domain: &str) -> ProbeOutcome {
        let start = Instant::now();
        let result =
            tokio::time::timeout(self.timeout, exchange(endpoint, domain, RecordType::TXT, false))
                .await;
        let latency = start.elapsed();

        match result {
            Ok(Ok(response)) => match response.response_code() {
                ResponseCode::NoError => ProbeOutcome {
                    success: true,
                    latency,
                    error: None,
                },
                rcode => ProbeOutcome {
                    success: false,
                    latency,
                    error: Some(rcode_name(rcode)),
                },
            },
            Ok(Err(e)) => ProbeOutcome {
                success: false,
                latency,
                error: Some(e.to_string()),
            },
            Err(_) => ProbeOutcome {
                success: false,
                latency,
                error: Some(format!("timeout after {:?}", self.timeout)),
            },
        }
    }
}

/// Query a recursive resolver for the domain's NS records.
///
/// Returns the nameserver host names, lowercased and without the trailing
/// dot, in response order. Used for propagation verification, so recursion
/// is requested.
pub async fn lookup_ns(resolver: &str, domain: &str, timeout: Duration) -> Result<Vec<String>> {
    let response = tokio::time::timeout(timeout, exchange(resolver, domain, RecordType::NS, true))
        .await
        .map_err(|_| Error::dns(format!("NS lookup via {} timed out", resolver)))??;

    if response.response_code() != ResponseCode::NoError {
        return Err(Error::dns(format!(
            "NS lookup for {} via {} returned {}",
            domain,
            resolver,
            rcode_name(response.response_code())
        )));
    }

    let mut nameservers = Vec::new();
    for record in response.answers() {
        if let Some(RData::NS(ns)) = record.data() {
            nameservers.push(normalize_ns_name(&ns.0.to_utf8()));
        }
    }
    Ok(nameservers)
}

/// Lowercase a nameserver name and strip the trailing root dot, so sets
/// from different sources compare cleanly.
pub fn normalize_ns_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Give an endpoint an explicit port, defaulting to 53.
///
/// Accepts `host`, `host:port`, bare IPv4/IPv6 literals, and
/// `[v6]:port` forms.
pub fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.parse::<std::net::SocketAddr>().is_ok() {
        return endpoint.to_string();
    }
    match endpoint.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{}]:53", v6),
        Ok(IpAddr::V4(v4)) => format!("{}:53", v4),
        Err(_) => {
            if endpoint.contains(':') {
                endpoint.to_string()
            } else {
                format!("{}:53", endpoint)
            }
        }
    }
}

/// One UDP DNS exchange: build the query, send, receive, decode, and check
/// the transaction id.
async fn exchange(
    endpoint: &str,
    domain: &str,
    record_type: RecordType,
    recursion_desired: bool,
) -> Result<Message> {
    let addr = normalize_endpoint(endpoint);

    let target = tokio::net::lookup_host(&addr)
        .await
        .map_err(|e| Error::dns(format!("failed to resolve {}: {}", addr, e)))?
        .next()
        .ok_or_else(|| Error::dns(format!("no address for {}", addr)))?;

    let query = build_query(domain, record_type, recursion_desired)?;
    let bytes = query
        .to_vec()
        .map_err(|e| Error::dns(format!("failed to encode query: {}", e)))?;

    let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| Error::dns(format!("failed to bind probe socket: {}", e)))?;
    socket
        .connect(target)
        .await
        .map_err(|e| Error::dns(format!("failed to connect to {}: {}", addr, e)))?;

    socket
        .send(&bytes)
        .await
        .map_err(|e| Error::dns(format!("failed to send query to {}: {}", addr, e)))?;

    let mut buf = [0u8; MAX_RESPONSE_SIZE];
    let len = socket
        .recv(&mut buf)
        .await
        .map_err(|e| Error::dns(format!("failed to receive from {}: {}", addr, e)))?;

    let response = Message::from_vec(&buf[..len])
        .map_err(|e| Error::dns(format!("malformed response from {}: {}", addr, e)))?;

    if response.id() != query.id() {
        return Err(Error::dns(format!(
            "response id mismatch from {} (sent {}, got {})",
            addr,
            query.id(),
            response.id()
        )));
    }

    Ok(response)
}

fn build_query(domain: &str, record_type: RecordType, recursion_desired: bool) -> Result<Message> {
    let mut name = Name::from_utf8(domain)
        .map_err(|e| Error::dns(format!("invalid query domain {}: {}", domain, e)))?;
    name.set_fqdn(true);

    let mut message = Message::new();
    message.set_id(next_query_id());
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(recursion_desired);
    message.add_query(Query::query(name, record_type));
    Ok(message)
}

/// The RCODE name as recorded in failed health results (NXDOMAIN, SERVFAIL,
/// REFUSED, ...).
fn rcode_name(code: ResponseCode) -> String {
    format!("{:?}", code).to_ascii_uppercase()
}

fn next_query_id() -> u16 {
    static COUNTER: OnceLock<AtomicU16> = OnceLock::new();
    let counter = COUNTER.get_or_init(|| {
        let seed = std::time::SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u16)
            .unwrap_or(0);
        AtomicU16::new(seed)
    });
    counter.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::rdata;
    use hickory_proto::rr::Record;

    #[test]
    fn endpoint_without_port_gets_53() {
        assert_eq!(normalize_endpoint("ns1.example.com"), "ns1.example.com:53");
        assert_eq!(normalize_endpoint("192.0.2.1"), "192.0.2.1:53");
        assert_eq!(normalize_endpoint("2001:db8::1"), "[2001:db8::1]:53");
    }

    #[test]
    fn endpoint_with_port_is_kept() {
        assert_eq!(normalize_endpoint("ns1.example.com:5353"), "ns1.example.com:5353");
        assert_eq!(normalize_endpoint("192.0.2.1:5353"), "192.0.2.1:5353");
        assert_eq!(normalize_endpoint("[2001:db8::1]:5353"), "[2001:db8::1]:5353");
    }

    #[test]
    fn ns_names_normalize_for_comparison() {
        assert_eq!(normalize_ns_name("NS1.Example.COM."), "ns1.example.com");
        assert_eq!(normalize_ns_name("ns1.example.com"), "ns1.example.com");
    }

    #[test]
    fn rcode_names_match_operator_vocabulary() {
        assert_eq!(rcode_name(ResponseCode::NXDomain), "NXDOMAIN");
        assert_eq!(rcode_name(ResponseCode::ServFail), "SERVFAIL");
        assert_eq!(rcode_name(ResponseCode::Refused), "REFUSED");
    }

    #[test]
    fn query_ids_vary() {
        let a = next_query_id();
        let b = next_query_id();
        assert_ne!(a, b);
    }

    /// Serve exactly one scripted DNS response on a loopback socket.
    async fn one_shot_responder(
        rcode: ResponseCode,
        answers: Vec<Record>,
    ) -> std::net::SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; MAX_RESPONSE_SIZE];
            let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
            let query = Message::from_vec(&buf[..len]).unwrap();

            let mut response = Message::new();
            response.set_id(query.id());
            response.set_message_type(MessageType::Response);
            response.set_op_code(OpCode::Query);
            response.set_response_code(rcode);
            for q in query.queries() {
                response.add_query(q.clone());
            }
            for answer in answers {
                response.add_answer(answer);
            }

            let bytes = response.to_vec().unwrap();
            socket.send_to(&bytes, peer).await.unwrap();
        });

        addr
    }

    #[tokio::test]
    async fn probe_classifies_noerror_as_success() {
        let addr = one_shot_responder(ResponseCode::NoError, Vec::new()).await;
        let prober = DnsProber::with_timeout(Duration::from_secs(2));

        let outcome = prober.probe(&addr.to_string(), "_health-check.example.com").await;
        assert!(outcome.success);
        assert_eq!(outcome.error, None);
    }

    #[tokio::test]
    async fn probe_records_rcode_name_on_failure() {
        let addr = one_shot_responder(ResponseCode::ServFail, Vec::new()).await;
        let prober = DnsProber::with_timeout(Duration::from_secs(2));

        let outcome = prober.probe(&addr.to_string(), "_health-check.example.com").await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("SERVFAIL"));
    }

    #[tokio::test]
    async fn probe_times_out_against_silent_server() {
        // Bound but never answered: the probe must fail with a timeout.
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        let prober = DnsProber::with_timeout(Duration::from_millis(200));
        let outcome = prober.probe(&addr.to_string(), "_health-check.example.com").await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("timeout"));
        drop(socket);
    }

    #[tokio::test]
    async fn lookup_ns_returns_normalized_names() {
        let name = Name::from_utf8("example.com.").unwrap();
        let answers = vec![
            Record::from_rdata(
                name.clone(),
                300,
                RData::NS(rdata::NS(Name::from_utf8("NS1.Backup.NET.").unwrap())),
            ),
            Record::from_rdata(
                name,
                300,
                RData::NS(rdata::NS(Name::from_utf8("ns2.backup.net.").unwrap())),
            ),
        ];
        let addr = one_shot_responder(ResponseCode::NoError, answers).await;

        let mut ns = lookup_ns(&addr.to_string(), "example.com", Duration::from_secs(2))
            .await
            .unwrap();
        ns.sort();
        assert_eq!(ns, vec!["ns1.backup.net".to_string(), "ns2.backup.net".to_string()]);
    }

    #[tokio::test]
    async fn lookup_ns_propagates_rcode_failures() {
        let addr = one_shot_responder(ResponseCode::Refused, Vec::new()).await;

        let err = lookup_ns(&addr.to_string(), "example.com", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("REFUSED"));
    }
}
