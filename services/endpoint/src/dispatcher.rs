//! Inbound message dispatch.
//!
//! The coordinator boundary is untrusted: anything that does not decode,
//! names an unknown action, or references an unknown identity key is
//! dropped without side effects. Nothing here closes the channel.

use crate::net::NetworkPrimitives;
use crate::pending::PendingProbeSet;
use crate::registry::{Device, Registry};
use rb_protocol::WsMessage;
use std::sync::Arc;
use tracing::{debug, error, info};

/// What a successfully dispatched message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// A wake packet was sent (or attempted) for this primary key.
    WakeSent { uuid: String },
    /// The device was added to the priority queue.
    ProbeQueued { uuid: String },
    /// The device was already queued; nothing changed.
    ProbeAlreadyQueued { uuid: String },
    /// A well-formed message the endpoint does not act on (e.g. an echo of
    /// an outbound action).
    Ignored { action: &'static str },
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    pending: Arc<PendingProbeSet>,
    net: Arc<dyn NetworkPrimitives>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        pending: Arc<PendingProbeSet>,
        net: Arc<dyn NetworkPrimitives>,
    ) -> Self {
        Self {
            registry,
            pending,
            net,
        }
    }

    /// Decode and act on one raw text frame.
    pub async fn handle(&self, raw: &str) -> Result<Dispatched, DispatchError> {
        let msg = WsMessage::from_json(raw)?;
        debug!(?msg, "received");

        match msg {
            WsMessage::RequestBoot(req) => {
                let device = self.resolve(&req.uuid)?;
                info!(uuid = %req.uuid, mac = %device.mac(), "sending wake packet");
                if let Err(e) = self.net.send_wake_packet(device.mac()).await {
                    error!(uuid = %req.uuid, mac = %device.mac(), error = %e, "wake packet failed");
                }
                Ok(Dispatched::WakeSent {
                    uuid: device.primary_key().to_owned(),
                })
            }
            WsMessage::RequestPing(req) => {
                let device = self.resolve(&req.uuid)?;
                let uuid = device.primary_key().to_owned();
                if self.pending.insert(Arc::clone(device)) {
                    debug!(uuid = %req.uuid, "priority probe queued");
                    Ok(Dispatched::ProbeQueued { uuid })
                } else {
                    debug!(uuid = %req.uuid, "priority probe already queued");
                    Ok(Dispatched::ProbeAlreadyQueued { uuid })
                }
            }
            other => Ok(Dispatched::Ignored {
                action: other.action(),
            }),
        }
    }

    fn resolve(&self, uuid: &str) -> Result<&Arc<Device>, DispatchError> {
        self.registry
            .lookup(uuid)
            .ok_or_else(|| DispatchError::UnknownDevice(uuid.to_owned()))
    }
}

/// Why an inbound message was dropped.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Not JSON, no `action`, an unknown action, or a missing `uuid`.
    #[error("undecodable message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unknown device: {0}")]
    UnknownDevice(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::net::{MacAddr, ProbeError, WakeError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct WakeRecorder {
        wakes: Mutex<Vec<MacAddr>>,
    }

    #[async_trait]
    impl NetworkPrimitives for WakeRecorder {
        async fn send_wake_packet(&self, mac: &MacAddr) -> Result<(), WakeError> {
            self.wakes.lock().unwrap().push(*mac);
            Ok(())
        }

        async fn echo_probe(&self, _host: &str, _timeout: Duration) -> Result<Duration, ProbeError> {
            Err(ProbeError::Timeout)
        }
    }

    fn setup() -> (Dispatcher, Arc<WakeRecorder>, Arc<PendingProbeSet>) {
        let registry = Arc::new(Registry::from_targets(&[
            TargetConfig {
                key: "k1".to_owned(),
                name: Some("Desktop".to_owned()),
                mac: Some("AA:BB:CC:DD:EE:FF".to_owned()),
                ip: Some("10.0.0.2".to_owned()),
            },
            TargetConfig {
                key: "k2".to_owned(),
                name: Some("Desktop (alias)".to_owned()),
                mac: Some("AA:BB:CC:DD:EE:FF".to_owned()),
                ip: None,
            },
        ]));
        let net = Arc::new(WakeRecorder::default());
        let pending = Arc::new(PendingProbeSet::new());
        let dispatcher = Dispatcher::new(registry, Arc::clone(&pending), net.clone());
        (dispatcher, net, pending)
    }

    #[tokio::test]
    async fn boot_via_alias_wakes_shared_device_once() {
        let (d, net, _) = setup();
        let out = d
            .handle(r#"{"action":"request_boot","uuid":"k2"}"#)
            .await
            .unwrap();
        assert_eq!(
            out,
            Dispatched::WakeSent {
                uuid: "k1".to_owned()
            }
        );
        let wakes = net.wakes.lock().unwrap();
        assert_eq!(wakes.as_slice(), &["AA:BB:CC:DD:EE:FF".parse::<MacAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn duplicate_ping_requests_queue_once() {
        let (d, _, pending) = setup();
        let first = d
            .handle(r#"{"action":"request_ping","uuid":"k1"}"#)
            .await
            .unwrap();
        let second = d
            .handle(r#"{"action":"request_ping","uuid":"k2"}"#)
            .await
            .unwrap();
        assert!(matches!(first, Dispatched::ProbeQueued { .. }));
        assert!(matches!(second, Dispatched::ProbeAlreadyQueued { .. }));
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn malformed_and_unknown_input_is_dropped() {
        let (d, net, pending) = setup();
        for raw in [
            "not json",
            r#"{"uuid":"k1"}"#,
            r#"{"action":"reboot_everything","uuid":"k1"}"#,
            r#"{"action":"request_boot"}"#,
        ] {
            assert!(
                matches!(d.handle(raw).await, Err(DispatchError::Decode(_))),
                "expected decode error for {raw}"
            );
        }
        assert!(matches!(
            d.handle(r#"{"action":"request_ping","uuid":"nope"}"#).await,
            Err(DispatchError::UnknownDevice(k)) if k == "nope"
        ));
        assert!(net.wakes.lock().unwrap().is_empty());
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn outbound_actions_are_ignored() {
        let (d, _, pending) = setup();
        let out = d
            .handle(r#"{"action":"ping","uuid":"k1","ping_ms":null}"#)
            .await
            .unwrap();
        assert_eq!(out, Dispatched::Ignored { action: "ping" });
        assert!(pending.is_empty());
    }
}
