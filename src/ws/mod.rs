//! WebSocket sessions for real-time streams

pub mod backoff;
pub mod connection;
pub mod handler;
pub mod ping;
pub mod session;

pub use backoff::ReconnectPolicy;
pub use connection::{
    Connector, Frame, Transport, TransportError, WebSocketConnection, WebSocketConnector,
};
pub use handler::{handler_fn, MessageHandler, SharedHandler, StreamMessage};
pub use ping::LivenessProbe;
pub use session::{ConnectionSession, SessionState};
