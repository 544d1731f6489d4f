// Shared helpers for endpoint integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use endpoint::config::{EndpointConfig, TargetConfig, TimingConfig};
use endpoint::net::{MacAddr, NetworkPrimitives, ProbeError, WakeError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Fake network
// ---------------------------------------------------------------------------

/// How the fake answers an echo probe for one host.
#[derive(Debug, Clone, Copy)]
pub enum ProbeBehavior {
    /// Reply with this round-trip time after sleeping for it.
    Reply(Duration),
    /// Fail immediately with a timeout error.
    Timeout,
    /// Never return; the caller's own timeout must cut it off.
    Hang,
}

/// Records every wake packet and probe instead of touching the network.
#[derive(Default)]
pub struct RecordingNetwork {
    wakes: Mutex<Vec<MacAddr>>,
    probes: Mutex<Vec<String>>,
    behavior: Mutex<HashMap<String, ProbeBehavior>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, host: &str, behavior: ProbeBehavior) {
        self.behavior
            .lock()
            .unwrap()
            .insert(host.to_owned(), behavior);
    }

    pub fn wakes(&self) -> Vec<MacAddr> {
        self.wakes.lock().unwrap().clone()
    }

    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().unwrap().clone()
    }

    /// Highest number of probes that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Poll until `n` wake packets were recorded (or `WAIT` elapses).
    pub async fn wait_for_wakes(&self, n: usize) -> Vec<MacAddr> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let wakes = self.wakes();
            if wakes.len() >= n || tokio::time::Instant::now() >= deadline {
                return wakes;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkPrimitives for RecordingNetwork {
    async fn send_wake_packet(&self, mac: &MacAddr) -> Result<(), WakeError> {
        self.wakes.lock().unwrap().push(*mac);
        Ok(())
    }

    async fn echo_probe(&self, host: &str, _timeout: Duration) -> Result<Duration, ProbeError> {
        self.probes.lock().unwrap().push(host.to_owned());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let behavior = self
            .behavior
            .lock()
            .unwrap()
            .get(host)
            .copied()
            .unwrap_or(ProbeBehavior::Reply(Duration::from_millis(2)));
        match behavior {
            ProbeBehavior::Reply(rtt) => {
                tokio::time::sleep(rtt).await;
                Ok(rtt)
            }
            ProbeBehavior::Timeout => Err(ProbeError::Timeout),
            ProbeBehavior::Hang => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

pub fn target(key: &str, mac: &str, ip: Option<&str>) -> TargetConfig {
    TargetConfig {
        key: key.to_owned(),
        name: Some(format!("{key} box")),
        mac: Some(mac.to_owned()),
        ip: ip.map(str::to_owned),
    }
}

/// Short timings so tests run in well under a second per cycle. The sweep
/// interval is long: only the first sweep happens during a test unless the
/// test overrides it.
pub fn fast_timing() -> TimingConfig {
    TimingConfig {
        reconnect_backoff: Duration::from_millis(200),
        probe_timeout: Duration::from_millis(100),
        sweep_interval: Duration::from_secs(60),
        scheduler_tick: Duration::from_millis(20),
        idle_recheck: Duration::from_millis(20),
    }
}

/// Config pointing at a local mock coordinator on `port` over plain ws://.
pub fn local_config(port: u16, targets: Vec<TargetConfig>) -> EndpointConfig {
    EndpointConfig {
        address: "127.0.0.1".to_owned(),
        port,
        secure: false,
        targets,
        timing: fast_timing(),
    }
}
