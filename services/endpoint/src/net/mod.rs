//! Network primitives: wake packets and echo probes.
//!
//! The rest of the endpoint only sees the [`NetworkPrimitives`] trait so
//! tests can substitute a recording fake for the real sockets.

pub mod echo;
pub mod mac;
pub mod wake;

use async_trait::async_trait;
use std::net::SocketAddrV4;
use std::time::Duration;

pub use echo::{EchoProber, ProbeError};
pub use mac::{MacAddr, MacParseError};
pub use wake::WakeError;

#[async_trait]
pub trait NetworkPrimitives: Send + Sync {
    /// Broadcast a wake packet for `mac`.
    async fn send_wake_packet(&self, mac: &MacAddr) -> Result<(), WakeError>;

    /// One echo probe to `host`, bounded by `timeout`. Returns the round-trip
    /// time on success.
    async fn echo_probe(&self, host: &str, timeout: Duration) -> Result<Duration, ProbeError>;
}

/// Real sockets: UDP broadcast for wake packets, ICMP for probes.
pub struct SystemNetwork {
    prober: EchoProber,
    wake_target: SocketAddrV4,
}

impl SystemNetwork {
    /// Must be called from within a tokio runtime (opens ICMP sockets).
    pub fn new() -> Self {
        Self {
            prober: EchoProber::new(),
            wake_target: wake::DEFAULT_WAKE_TARGET,
        }
    }

    pub fn with_wake_target(mut self, target: SocketAddrV4) -> Self {
        self.wake_target = target;
        self
    }
}

impl Default for SystemNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkPrimitives for SystemNetwork {
    async fn send_wake_packet(&self, mac: &MacAddr) -> Result<(), WakeError> {
        wake::send_magic_packet(mac, self.wake_target).await
    }

    async fn echo_probe(&self, host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
        self.prober.probe(host, timeout).await
    }
}
