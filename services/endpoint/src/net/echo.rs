//! ICMP echo probes.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};
use tracing::warn;

const PAYLOAD: [u8; 56] = [0; 56];

/// Owns the ICMP sockets used for echo probes.
///
/// Sockets are opened once; a family whose socket could not be opened (no
/// privileges, no IPv6 stack) fails every probe with [`ProbeError::Socket`].
pub struct EchoProber {
    v4: Result<Client, String>,
    v6: Result<Client, String>,
    ident: u16,
    seq: AtomicU16,
}

impl EchoProber {
    /// Open the ICMP sockets. Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let v4 = Client::new(&Config::default()).map_err(|e| e.to_string());
        let v6 = Client::new(&Config::builder().kind(ICMP::V6).build()).map_err(|e| e.to_string());
        if let Err(e) = &v4 {
            warn!(error = %e, "could not open ICMPv4 socket; IPv4 probes will report no answer");
        }
        Self {
            v4,
            v6,
            ident: u16::try_from(std::process::id() & 0xFFFF).unwrap_or_default(),
            seq: AtomicU16::new(0),
        }
    }

    /// Send one echo request to `host` (IP literal or hostname) and wait at
    /// most `timeout` for the reply.
    pub async fn probe(&self, host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
        let ip = resolve(host).await?;
        let client = match ip {
            IpAddr::V4(_) => &self.v4,
            IpAddr::V6(_) => &self.v6,
        };
        let client = client.as_ref().map_err(|e| ProbeError::Socket(e.clone()))?;

        let mut pinger = client.pinger(ip, PingIdentifier(self.ident)).await;
        pinger.timeout(timeout);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        match pinger.ping(PingSequence(seq), &PAYLOAD).await {
            Ok((_packet, rtt)) => Ok(rtt),
            Err(SurgeError::Timeout { .. }) => Err(ProbeError::Timeout),
            Err(e) => Err(ProbeError::Icmp(e.to_string())),
        }
    }
}

impl Default for EchoProber {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve an IP literal or hostname to the first address returned.
pub async fn resolve(host: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ProbeError::Resolve(format!("{host}: {e}")))?;
    addrs
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::Resolve(format!("{host}: no addresses")))
}

/// Why an echo probe produced no latency. Never surfaced to the coordinator
/// beyond a `null` result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("could not resolve {0}")]
    Resolve(String),
    #[error("no echo reply before timeout")]
    Timeout,
    #[error("ICMP socket unavailable: {0}")]
    Socket(String),
    #[error("ICMP error: {0}")]
    Icmp(String),
}
