//! Orchestrator: builds the shared context and hands it to the connection
//! manager.

use crate::channel::ControlChannel;
use crate::config::{EndpointConfig, TimingConfig};
use crate::connection::ConnectionManager;
use crate::net::NetworkPrimitives;
use crate::pending::PendingProbeSet;
use crate::registry::Registry;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// State shared by the connection manager, dispatcher and scheduler.
///
/// The registry is immutable once built. The pending set outlives individual
/// channels, so requests survive a short outage.
pub struct AgentContext {
    pub registry: Arc<Registry>,
    pub pending: Arc<PendingProbeSet>,
    pub net: Arc<dyn NetworkPrimitives>,
    pub timing: TimingConfig,
    current_channel: RwLock<Option<ControlChannel>>,
}

impl AgentContext {
    pub fn new(registry: Registry, net: Arc<dyn NetworkPrimitives>, timing: TimingConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            pending: Arc::new(PendingProbeSet::new()),
            net,
            timing,
            current_channel: RwLock::new(None),
        }
    }

    /// The live channel, if one is registered.
    pub fn current_channel(&self) -> Option<ControlChannel> {
        self.current_channel.read().ok().and_then(|c| c.clone())
    }

    pub(crate) fn set_current_channel(&self, channel: Option<ControlChannel>) {
        if let Ok(mut slot) = self.current_channel.write() {
            *slot = channel;
        }
    }
}

pub struct Agent {
    url: String,
    ctx: Arc<AgentContext>,
}

impl Agent {
    pub fn new(config: &EndpointConfig, net: Arc<dyn NetworkPrimitives>) -> Self {
        let registry = Registry::from_targets(&config.targets);
        info!(
            devices = registry.len(),
            uuids = registry.keys().len(),
            "device registry built"
        );
        Self {
            url: config.channel_url(),
            ctx: Arc::new(AgentContext::new(registry, net, config.timing)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn context(&self) -> &Arc<AgentContext> {
        &self.ctx
    }

    pub fn connection_manager(&self) -> ConnectionManager {
        ConnectionManager::new(self.url.clone(), Arc::clone(&self.ctx))
    }

    /// Run until `shutdown` is cancelled. Returns after the active scheduler
    /// has been joined and the channel closed.
    pub async fn run(self, shutdown: CancellationToken) {
        self.connection_manager().run(shutdown).await;
    }
}
