//! Infrastructure - cold path only
//!
//! This module contains the ambient pieces around the stream core:
//! - Configuration management
//! - Logging
//! - Metrics

pub mod config;
pub mod logging;
pub mod metrics;

pub use metrics::{MetricsSnapshot, StreamMetrics};
