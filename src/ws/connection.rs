//! WebSocket transport
//!
//! `Transport` is the full-duplex socket a session drives; `Connector` opens
//! one per connect attempt. The production pair wraps tokio-tungstenite:
//! - Disabled compression and TCP_NODELAY on plain sockets
//! - Data frames that arrive while waiting for a pong are queued, not lost
//! - Protocol ping/pong frames never reach the caller

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};

/// Application-level frame received from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Peer sent a close frame or the stream ended
    Closed,
}

/// Errors that can occur with WebSocket connections
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Timeout")]
    Timeout,
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TransportError>;

/// One open socket. Timeouts are applied by the caller.
#[async_trait]
pub trait Transport: Send {
    /// Next data frame
    async fn recv(&mut self) -> Result<Frame>;

    /// Send a ping and resolve once the matching pong arrives
    async fn ping(&mut self) -> Result<()>;

    /// Close gracefully
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports for a URL
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// tokio-tungstenite connector
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let conn = WebSocketConnection::connect(url).await?;
        Ok(Box::new(conn))
    }
}

/// WebSocket connection backed by tokio-tungstenite
pub struct WebSocketConnection {
    /// Underlying WebSocket stream
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// Data frames read while a ping was outstanding
    pending: VecDeque<Frame>,
    /// Set once a close frame was sent or received
    closed: bool,
}

impl WebSocketConnection {
    /// Connect to WebSocket endpoint
    ///
    /// No timeout here; the session bounds the whole attempt.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if let MaybeTlsStream::Plain(tcp) = ws_stream.get_ref() {
            tcp.set_nodelay(true)
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        }

        Ok(Self {
            stream: ws_stream,
            pending: VecDeque::new(),
            closed: false,
        })
    }

    /// Read the next frame off the socket, skipping control frames
    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(Frame::Text(text.as_str().to_owned()))),
            Some(Ok(Message::Binary(data))) => Ok(Some(Frame::Binary(data.to_vec()))),
            // tungstenite queues the pong reply itself
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Ok(Message::Pong(_))) => Ok(None),
            Some(Ok(Message::Close(_))) | None => {
                self.closed = true;
                Ok(Some(Frame::Closed))
            }
            Some(Err(e)) => Err(TransportError::ReceiveFailed(e.to_string())),
        }
    }
}

#[async_trait]
impl Transport for WebSocketConnection {
    async fn recv(&mut self) -> Result<Frame> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }
        loop {
            if let Some(frame) = self.read_frame().await? {
                return Ok(frame);
            }
        }
    }

    async fn ping(&mut self) -> Result<()> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        self.stream
            .send(Message::Ping(Bytes::from_static(b"keepalive")))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Pong(_))) => return Ok(()),
                Some(Ok(Message::Text(text))) => {
                    self.pending.push_back(Frame::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    self.pending.push_back(Frame::Binary(data.to_vec()));
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            // Peer may already be gone; a failed close handshake is not an error
            let _ = self.stream.close(None).await;
        }
        Ok(())
    }
}
