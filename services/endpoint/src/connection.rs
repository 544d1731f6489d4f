//! Connection manager: the reconnect state machine.
//!
//! ```text
//! Disconnected -> Connecting -> Registered -> Closing -> Disconnected -> ...
//!       ^              |
//!       +-- backoff ---+ (open failed)
//! ```
//!
//! There is no terminal state: every transport failure ends in a fixed
//! back-off and another attempt. Only the shutdown token stops the loop.
//!
//! Each registered channel gets exactly one probe scheduler. The previous
//! scheduler is always cancelled and joined before a new one is spawned, so
//! at most one scheduler ever writes to a channel.

use crate::agent::AgentContext;
use crate::channel::{self, ChannelError, ChannelReader, ControlChannel};
use crate::dispatcher::Dispatcher;
use crate::scheduler::{ProbeScheduler, SchedulerHandle};
use rb_protocol::{Register, WsMessage};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Registration sent; receiving.
    Registered,
    Closing,
}

pub struct ConnectionManager {
    url: String,
    ctx: Arc<AgentContext>,
    dispatcher: Dispatcher,
    state_tx: watch::Sender<ConnectionState>,
    scheduler: Option<SchedulerHandle>,
    next_channel_id: u64,
}

/// How a registered session ended without a transport error.
enum SessionEnd {
    Shutdown,
}

impl ConnectionManager {
    pub fn new(url: String, ctx: Arc<AgentContext>) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&ctx.registry),
            Arc::clone(&ctx.pending),
            Arc::clone(&ctx.net),
        );
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url,
            ctx,
            dispatcher,
            state_tx,
            scheduler: None,
            next_channel_id: 1,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Connect, serve, and reconnect until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let backoff = self.ctx.timing.reconnect_backoff;
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.session(&shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Err(ChannelError::Closed) => info!("channel closed"),
                Err(e) => warn!(error = %e, "channel lost"),
            }
            self.set_state(ConnectionState::Disconnected);

            info!(
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                "waiting before reconnect"
            );
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        self.stop_scheduler().await;
        self.ctx.set_current_channel(None);
        self.set_state(ConnectionState::Disconnected);
        info!("connection manager stopped");
    }

    /// One connect -> register -> receive cycle.
    async fn session(&mut self, shutdown: &CancellationToken) -> Result<SessionEnd, ChannelError> {
        self.set_state(ConnectionState::Connecting);
        let id = self.next_channel_id;
        self.next_channel_id += 1;
        info!(url = %self.url, channel = id, "connecting");

        let (channel, reader) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
            opened = channel::open(&self.url, id) => opened?,
        };
        info!(channel = id, "connected");

        let result = self.serve(&channel, reader, shutdown).await;

        self.set_state(ConnectionState::Closing);
        self.ctx.set_current_channel(None);
        self.stop_scheduler().await;
        channel.close().await;
        result
    }

    async fn serve(
        &mut self,
        channel: &ControlChannel,
        mut reader: ChannelReader,
        shutdown: &CancellationToken,
    ) -> Result<SessionEnd, ChannelError> {
        let register = WsMessage::Register(Register {
            uuids: self.ctx.registry.keys().to_vec(),
        });
        channel.send(&register).await?;

        self.replace_scheduler(channel.clone()).await;
        self.ctx.set_current_channel(Some(channel.clone()));
        self.set_state(ConnectionState::Registered);
        info!(channel = channel.id(), uuids = self.ctx.registry.keys().len(), "registered");

        loop {
            let text = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
                text = reader.next_text() => text?,
            };
            match self.dispatcher.handle(&text).await {
                Ok(done) => debug!(channel = channel.id(), ?done, "dispatched"),
                Err(e) => debug!(channel = channel.id(), error = %e, "dropping inbound message"),
            }
        }
    }

    /// Stop whatever scheduler is running, then bind a new one to `channel`.
    async fn replace_scheduler(&mut self, channel: ControlChannel) {
        self.stop_scheduler().await;
        self.scheduler = Some(ProbeScheduler::spawn(Arc::clone(&self.ctx), channel));
    }

    async fn stop_scheduler(&mut self) {
        if let Some(handle) = self.scheduler.take() {
            let channel_id = handle.channel_id();
            if let Err(e) = handle.stop().await {
                warn!(channel = channel_id, error = %e, "probe scheduler ended with send error");
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = self.state_tx.send_replace(state);
        if prev != state {
            debug!(from = ?prev, to = ?state, "connection state");
        }
    }
}
