//! Probe scheduler.
//!
//! One scheduler task is bound to exactly one channel instance for its whole
//! life. Each iteration drains the priority queue, then sweeps every device
//! if the sweep interval has elapsed, then sleeps one tick. The owning
//! connection manager stops it with [`SchedulerHandle::stop`], which cancels
//! and then waits for the task to finish, before a replacement may start.

use crate::agent::AgentContext;
use crate::channel::{ChannelError, ControlChannel};
use crate::registry::{Device, LastProbe};
use rb_protocol::{PingResult, WsMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct ProbeScheduler {
    ctx: Arc<AgentContext>,
    channel: ControlChannel,
    last_sweep: Option<Instant>,
}

impl ProbeScheduler {
    pub fn new(ctx: Arc<AgentContext>, channel: ControlChannel) -> Self {
        Self {
            ctx,
            channel,
            last_sweep: None,
        }
    }

    /// Spawn the scheduler loop for `channel`.
    pub fn spawn(ctx: Arc<AgentContext>, channel: ControlChannel) -> SchedulerHandle {
        let channel_id = channel.id();
        let cancel = CancellationToken::new();
        let scheduler = Self::new(ctx, channel);
        let task = tokio::spawn(scheduler.run(cancel.clone()));
        info!(channel = channel_id, "probe scheduler started");
        SchedulerHandle {
            channel_id,
            cancel,
            task,
        }
    }

    /// Loop until cancelled or until a send on the bound channel fails.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ChannelError> {
        loop {
            if !self.channel.is_open() {
                // Only reachable while the owner is tearing this channel down.
                if !sleep_unless_cancelled(self.ctx.timing.idle_recheck, &cancel).await {
                    return Ok(());
                }
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                result = self.tick() => result?,
            }

            if !sleep_unless_cancelled(self.ctx.timing.scheduler_tick, &cancel).await {
                return Ok(());
            }
        }
    }

    /// One iteration: drain priority requests, then sweep if due.
    pub async fn tick(&mut self) -> Result<(), ChannelError> {
        // Dequeue only after the result went out; a cancelled or failed
        // probe leaves the request for the next channel's scheduler.
        while let Some(device) = self.ctx.pending.front() {
            debug!(uuid = %device.primary_key(), "priority probe");
            self.probe_and_report(&device).await?;
            self.ctx.pending.remove(&device);
        }

        let sweep_due = self
            .last_sweep
            .is_none_or(|t| t.elapsed() >= self.ctx.timing.sweep_interval);
        if sweep_due {
            for device in self.ctx.registry.devices() {
                self.probe_and_report(device).await?;
            }
            self.last_sweep = Some(Instant::now());
        }
        Ok(())
    }

    /// Probe one device and send its result. Devices without an address are
    /// skipped and nothing is sent; returns whether a result went out.
    pub async fn probe_and_report(&self, device: &Device) -> Result<bool, ChannelError> {
        let Some(host) = device.address() else {
            debug!(uuid = %device.primary_key(), "no address, skipping probe");
            return Ok(false);
        };

        let outcome = probe(&self.ctx, host).await;
        device.record_probe(outcome);
        if outcome == LastProbe::NoAnswer {
            debug!(uuid = %device.primary_key(), host, "no answer");
        }

        let msg = WsMessage::Ping(PingResult {
            uuid: device.primary_key().to_owned(),
            ping_ms: outcome.as_ms(),
        });
        self.channel.send(&msg).await?;
        Ok(true)
    }
}

/// Echo probe bounded by the configured timeout; every failure is a
/// [`LastProbe::NoAnswer`].
async fn probe(ctx: &AgentContext, host: &str) -> LastProbe {
    let timeout = ctx.timing.probe_timeout;
    match tokio::time::timeout(timeout, ctx.net.echo_probe(host, timeout)).await {
        Ok(Ok(rtt)) => LastProbe::Latency {
            ms: rtt.as_secs_f64() * 1000.0,
        },
        Ok(Err(e)) => {
            debug!(host, error = %e, "echo probe failed");
            LastProbe::NoAnswer
        }
        Err(_) => LastProbe::NoAnswer,
    }
}

/// Returns `false` if cancelled before `duration` elapsed.
async fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Handle to a running scheduler task.
pub struct SchedulerHandle {
    channel_id: u64,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), ChannelError>>,
}

impl SchedulerHandle {
    /// The channel instance this scheduler is bound to.
    pub fn channel_id(&self) -> u64 {
        self.channel_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the task and wait for it to finish.
    ///
    /// When this returns the scheduler no longer holds the channel lock and
    /// will never send again. Returns the send error that ended the task, if
    /// any.
    pub async fn stop(self) -> Result<(), ChannelError> {
        self.cancel.cancel();
        match self.task.await {
            Ok(result) => {
                info!(channel = self.channel_id, "probe scheduler stopped");
                result
            }
            Err(e) => {
                error!(channel = self.channel_id, error = %e, "probe scheduler task failed");
                Ok(())
            }
        }
    }
}
