// mock_coordinator: A mock coordinator WebSocket server for endpoint tests.
//
// Accepts connections on ws://127.0.0.1:<port>, and hands each accepted
// connection to the test so it can read what the endpoint sent, push
// requests back, and drop the connection to simulate an outage.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rb_protocol::WsMessage;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::Message;

type ServerStream = WebSocketStream<TcpStream>;

/// A mock coordinator for integration testing.
///
/// Binds to port 0 (random) and exposes the actual bound port. Each test
/// can spin up its own isolated instance.
pub struct MockCoordinator {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<CoordinatorConnection>,
    /// Handle to the background accept loop; aborted when the server is dropped.
    task: tokio::task::JoinHandle<()>,
}

impl MockCoordinator {
    /// Start the mock coordinator, binding to a random available port.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            Self::accept_loop(listener, tx).await;
        });

        Ok(Self {
            addr,
            connections: rx,
            task,
        })
    }

    /// Return the address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The URL an endpoint would be configured with, including the
    /// endpoint query string.
    pub fn url(&self) -> String {
        format!("ws://{}/?{}", self.addr, rb_protocol::ENDPOINT_QUERY)
    }

    /// Wait for the next endpoint connection (up to `timeout`).
    pub async fn accept(
        &mut self,
        timeout: Duration,
    ) -> Result<CoordinatorConnection, Box<dyn std::error::Error>> {
        match tokio::time::timeout(timeout, self.connections.recv()).await {
            Ok(Some(conn)) => Ok(conn),
            Ok(None) => Err("accept loop stopped".into()),
            Err(_) => Err("no endpoint connected before timeout".into()),
        }
    }

    /// Stop accepting new connections. Already accepted connections stay
    /// usable until dropped.
    pub fn stop_accepting(&self) {
        self.task.abort();
    }

    // -- internal --

    async fn accept_loop(listener: TcpListener, tx: mpsc::UnboundedSender<CoordinatorConnection>) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        // In tests, handshake errors are expected (e.g. client drops).
                        if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                            let (write, read) = ws.split();
                            let _ = tx.send(CoordinatorConnection { peer, write, read });
                        }
                    });
                }
                Err(_) => break,
            }
        }
    }
}

impl Drop for MockCoordinator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One accepted endpoint connection, seen from the coordinator side.
pub struct CoordinatorConnection {
    peer: SocketAddr,
    write: SplitSink<ServerStream, Message>,
    read: SplitStream<ServerStream>,
}

impl CoordinatorConnection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send a typed message to the endpoint.
    pub async fn send_message(&mut self, msg: &WsMessage) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(msg)?;
        self.send_text(&json).await
    }

    /// Send an arbitrary text frame (used to inject malformed payloads).
    pub async fn send_text(&mut self, text: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Text(text.to_owned().into())).await?;
        Ok(())
    }

    /// Receive the next decoded message from the endpoint (up to `timeout`).
    pub async fn recv_message(
        &mut self,
        timeout: Duration,
    ) -> Result<WsMessage, Box<dyn std::error::Error>> {
        tokio::time::timeout(timeout, self.recv_inner())
            .await
            .map_err(|_| "no message before timeout")?
    }

    /// Assert-style helper: true when nothing arrives within `window`.
    pub async fn is_quiet_for(&mut self, window: Duration) -> bool {
        tokio::time::timeout(window, self.recv_inner()).await.is_err()
    }

    /// Close the connection with a close frame, as a coordinator restart would.
    pub async fn close(mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }

    async fn recv_inner(&mut self) -> Result<WsMessage, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let msg: WsMessage = serde_json::from_str(&text)?;
                    return Ok(msg);
                }
                Some(Ok(Message::Ping(data))) => {
                    self.write.send(Message::Pong(data)).await?;
                    continue;
                }
                Some(Ok(Message::Close(_))) => return Err("connection closed by endpoint".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }
}
