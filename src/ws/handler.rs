//! Message handler capability
//!
//! Sessions decode each frame into a JSON document and hand it to a
//! `MessageHandler`. Combined-stream envelopes are unwrapped here, so every
//! handler sees the same `StreamMessage` shape regardless of route.

use crate::core::Route;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// One decoded stream event
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage {
    /// Stream the payload belongs to
    pub stream: String,
    /// Decoded payload
    pub data: Value,
}

impl StreamMessage {
    /// Build from a decoded document.
    ///
    /// Combined routes wrap payloads as `{"stream": <name>, "data": <payload>}`;
    /// documents that do not match that shape are passed through whole.
    pub fn from_document(route: Route, stream: &str, document: Value) -> Self {
        if route == Route::Combined {
            if let Value::Object(mut envelope) = document {
                let inner = match envelope.get("stream") {
                    Some(Value::String(name)) if envelope.contains_key("data") => {
                        Some(name.clone())
                    }
                    _ => None,
                };
                return match inner {
                    Some(name) => Self {
                        stream: name,
                        data: envelope.remove("data").unwrap_or(Value::Null),
                    },
                    None => Self {
                        stream: stream.to_string(),
                        data: Value::Object(envelope),
                    },
                };
            }
        }

        Self {
            stream: stream.to_string(),
            data: document,
        }
    }
}

/// Decode a frame body into a JSON document
pub fn decode_document(mut payload: Vec<u8>) -> Result<Value, simd_json::Error> {
    simd_json::serde::from_slice(&mut payload)
}

/// Caller-supplied consumer of stream messages.
///
/// Returning `Err` is fatal for the current connection: the session drops the
/// socket and reconnects with backoff.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: StreamMessage) -> anyhow::Result<()>;
}

/// Shared handler reference; identity survives listen key rotation
pub type SharedHandler = Arc<dyn MessageHandler>;

/// Adapter turning an async closure into a handler
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(StreamMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, message: StreamMessage) -> anyhow::Result<()> {
        (self.0)(message).await
    }
}

/// Wrap an async closure as a `SharedHandler`
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(StreamMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
