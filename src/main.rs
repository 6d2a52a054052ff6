//! Binance stream runner
//!
//! # Architecture
//! - **core**: Stream identifiers and name builders
//! - **ws**: Reconnecting WebSocket sessions
//! - **manager**: Stream registry and user-data key renewal
//! - **rest**: Listen key REST client
//! - **infrastructure**: Cold path (logging, metrics, config)
//!
//! Subscribes the feeds from config.toml and logs every message until Ctrl-C.

use binance_streams::infrastructure::config::{Config, FeedsConfig};
use binance_streams::infrastructure::logging::init_logging;
use binance_streams::{
    handler_fn, log_main, streams, Result, StreamId, StreamManager, StreamMessage,
};
use tracing::Level;

/// Main application state
pub struct StreamApp {
    manager: StreamManager,
    feeds: FeedsConfig,
}

impl StreamApp {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            manager: StreamManager::from_config(config)?,
            feeds: config.feeds.clone(),
        })
    }

    /// Subscribe the configured feeds and block until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        log_main!(Level::INFO, "Starting Binance stream runner...");

        let print = handler_fn(|msg: StreamMessage| async move {
            log_main!(Level::INFO, stream = %msg.stream, data = %msg.data, "Message");
            Ok(())
        });

        let ids: Vec<StreamId> = self
            .feeds
            .streams
            .iter()
            .map(|s| StreamId::new(s.as_str()))
            .collect();
        if self.feeds.combined && !ids.is_empty() {
            let id = self.manager.start_stream(streams::multiplex(&ids), print.clone()).await;
            log_main!(Level::INFO, stream = %id, "Subscribed combined stream");
        } else {
            for id in ids {
                let id = self.manager.start_stream(id, print.clone()).await;
                log_main!(Level::INFO, stream = %id, "Subscribed");
            }
        }

        if self.feeds.user_stream {
            match self.manager.start_user_stream(print.clone()).await {
                Ok(_) => log_main!(Level::INFO, "Subscribed user data stream"),
                Err(e) => log_main!(Level::ERROR, error = %e, "User data stream unavailable"),
            }
        }

        tokio::signal::ctrl_c().await?;
        log_main!(Level::INFO, "Shutdown requested");

        self.manager.close_all().await;

        let snapshot = self.manager.metrics().snapshot();
        log_main!(
            Level::INFO,
            delivered = snapshot.messages_delivered,
            decode_failures = snapshot.decode_failures,
            reconnects = snapshot.reconnects,
            terminated = snapshot.sessions_terminated,
            rate = snapshot.message_rate,
            staleness_ms = self.manager.metrics().staleness_ms(),
            "Final metrics"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // Guards flush the file appenders on exit
    let _guards = init_logging(&config.logging)?;

    let app = StreamApp::new(&config)?;
    app.run().await?;

    Ok(())
}
