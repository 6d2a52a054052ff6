//! Core stream identity types
//!
//! - StreamId: opaque registry key naming one logical stream
//! - Route: which endpoint prefix a stream connects through
//! - streams: pure builders for Binance stream names

pub mod stream_id;
pub mod streams;

pub use stream_id::{Route, StreamId};
pub use streams::{DepthLevel, KlineInterval};
