//! Control channel to the coordinator.
//!
//! A channel is one WebSocket connection, split into a shared write half
//! ([`ControlChannel`], cloned into the probe scheduler) and a read half
//! ([`ChannelReader`], owned by the receive loop). Either side can end the
//! channel: a failed send marks it closed, which wakes the reader, and a
//! failed read marks it closed, which makes later sends fail fast.
//!
//! # Protocol
//! 1. Connect to `{wss|ws}://host:port/?tgt=remote_boot&client_type=endpoint`
//! 2. Send `register` with every identity key
//! 3. Exchange JSON text frames until either side goes away

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rb_protocol::WsMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Upper bound for the TCP + TLS + WebSocket handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
/// Upper bound for writing one frame.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Write half
// ---------------------------------------------------------------------------

/// Cloneable write handle for one channel instance.
#[derive(Clone)]
pub struct ControlChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    id: u64,
    sink: Mutex<SplitSink<WsStream, Message>>,
    closed: CancellationToken,
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("id", &self.inner.id)
            .field("open", &self.is_open())
            .finish()
    }
}

impl ControlChannel {
    /// Identifier of this channel instance, unique for the process lifetime.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_open(&self) -> bool {
        !self.inner.closed.is_cancelled()
    }

    /// Serialize and send one message.
    ///
    /// Any failure marks the channel closed.
    pub async fn send(&self, msg: &WsMessage) -> Result<(), ChannelError> {
        let json = msg.to_json()?;
        debug!(channel = self.id(), payload = %json, "sending");
        self.send_frame(Message::Text(json.into())).await
    }

    /// Mark the channel closed without touching the socket.
    pub fn mark_closed(&self) {
        self.inner.closed.cancel();
    }

    /// Resolves once the channel has been marked closed.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    /// Best-effort close frame, then mark closed.
    pub async fn close(&self) {
        if self.is_open() {
            let mut sink = self.inner.sink.lock().await;
            let _ = tokio::time::timeout(SEND_TIMEOUT, sink.send(Message::Close(None))).await;
        }
        self.mark_closed();
    }

    async fn send_frame(&self, frame: Message) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        let mut sink = self.inner.sink.lock().await;
        let result = match tokio::time::timeout(SEND_TIMEOUT, sink.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ChannelError::Ws(e.to_string())),
            Err(_) => Err(ChannelError::Timeout),
        };
        if result.is_err() {
            self.mark_closed();
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Read half
// ---------------------------------------------------------------------------

/// Read half of a channel, owned by the receive loop.
pub struct ChannelReader {
    stream: SplitStream<WsStream>,
    channel: ControlChannel,
}

impl ChannelReader {
    /// Wait for the next text frame.
    ///
    /// Pings are answered, other control and binary frames skipped. Returns
    /// [`ChannelError::Closed`] once the peer closes or the channel is marked
    /// closed from the write side.
    pub async fn next_text(&mut self) -> Result<String, ChannelError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.channel.closed() => return Err(ChannelError::Closed),
                next = self.stream.next() => next,
            };
            match next {
                None => {
                    self.channel.mark_closed();
                    return Err(ChannelError::Closed);
                }
                Some(Err(e)) => {
                    self.channel.mark_closed();
                    return Err(ChannelError::Ws(e.to_string()));
                }
                Some(Ok(msg)) => match msg {
                    Message::Text(t) => return Ok(t.as_str().to_owned()),
                    Message::Close(_) => {
                        self.channel.mark_closed();
                        return Err(ChannelError::Closed);
                    }
                    Message::Ping(data) => {
                        self.channel.send_frame(Message::Pong(data)).await?;
                        continue;
                    }
                    _ => continue,
                },
            }
        }
    }
}

/// Open a channel to `url`.
pub async fn open(url: &str, id: u64) -> Result<(ControlChannel, ChannelReader), ChannelError> {
    let (ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url))
        .await
        .map_err(|_| ChannelError::Connect(format!("timed out connecting to '{}'", url)))?
        .map_err(|e| ChannelError::Connect(e.to_string()))?;
    let (sink, stream) = ws.split();
    let channel = ControlChannel {
        inner: Arc::new(ChannelInner {
            id,
            sink: Mutex::new(sink),
            closed: CancellationToken::new(),
        }),
    };
    let reader = ChannelReader {
        stream,
        channel: channel.clone(),
    };
    Ok((channel, reader))
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection error: {0}")]
    Connect(String),
    #[error("WebSocket error: {0}")]
    Ws(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("send timed out")]
    Timeout,
    #[error("channel closed")]
    Closed,
}
