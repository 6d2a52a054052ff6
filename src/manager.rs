//! Stream registry
//!
//! Owns every `ConnectionSession`, keyed by `StreamId`, with at most one
//! session per identifier. Also owns the single authenticated user-data
//! session: its listen key, handler and the timer that keeps the key alive.

use crate::core::StreamId;
use crate::infrastructure::config::{Config, StreamConfig};
use crate::infrastructure::metrics::StreamMetrics;
use crate::log_ws;
use crate::rest::{CredentialSource, ListenKeyClient};
use crate::ws::connection::{Connector, WebSocketConnector};
use crate::ws::handler::SharedHandler;
use crate::ws::session::{ConnectionSession, SessionState};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::Level;

/// User-data stream slot
#[derive(Default)]
struct AuthenticatedSession {
    listen_key: Option<StreamId>,
    timer: Option<JoinHandle<()>>,
    handler: Option<SharedHandler>,
}

#[derive(Default)]
struct ManagerState {
    sessions: HashMap<StreamId, ConnectionSession>,
    auth: AuthenticatedSession,
}

struct Shared {
    config: Arc<StreamConfig>,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialSource>,
    metrics: Arc<StreamMetrics>,
    state: Mutex<ManagerState>,
}

/// Registry of live streams
///
/// All operations serialize on one async lock, so the manager can be shared
/// behind an `Arc` and called from several tasks.
pub struct StreamManager {
    shared: Arc<Shared>,
}

impl StreamManager {
    pub fn new(
        config: StreamConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config: Arc::new(config),
                connector,
                credentials,
                metrics: Arc::new(StreamMetrics::new()),
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    /// Manager with the live Binance connector and listen key client
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let credentials = ListenKeyClient::new(&config.rest)?;
        Ok(Self::new(
            config.stream.clone(),
            Arc::new(WebSocketConnector),
            Arc::new(credentials),
        ))
    }

    /// Start a session for `id` unless one is already live.
    ///
    /// A live session keeps the handler it was started with; `handler` is ignored then.
    /// A session that exhausted its reconnect budget is replaced.
    pub async fn start_stream(&self, id: impl Into<StreamId>, handler: SharedHandler) -> StreamId {
        let id = id.into();
        let mut state = self.shared.state.lock().await;
        self.shared.start_locked(&mut state, id.clone(), handler).await;
        id
    }

    /// Cancel and forget the session for `id`. Unknown ids are ignored.
    ///
    /// Stopping the user-data stream also disarms renewal and revokes its key.
    pub async fn stop_stream(&self, id: &StreamId) {
        let revoked = {
            let mut state = self.shared.state.lock().await;
            self.shared.stop_locked(&mut state, id).await
        };
        if let Some(key) = revoked {
            self.shared.revoke(&key).await;
        }
    }

    /// Open the authenticated user-data stream and keep its key renewed.
    ///
    /// Replaces a user stream started earlier.
    pub async fn start_user_stream(&self, handler: SharedHandler) -> crate::Result<StreamId> {
        let key = self.shared.credentials.issue_key().await?;
        let id = StreamId::listen_key(key);

        let replaced = {
            let mut state = self.shared.state.lock().await;
            let replaced = match state.auth.listen_key.clone() {
                Some(previous) => self.shared.stop_locked(&mut state, &previous).await,
                None => None,
            };

            self.shared
                .start_locked(&mut state, id.clone(), Arc::clone(&handler))
                .await;
            state.auth.listen_key = Some(id.clone());
            state.auth.handler = Some(handler);
            state.auth.timer = Some(tokio::spawn(renewal_loop(
                Arc::downgrade(&self.shared),
                self.shared.config.user_renewal_interval(),
            )));
            replaced
        };

        // Binance hands back the active key while it is valid; keep that one
        if let Some(previous) = replaced.filter(|previous| *previous != id) {
            self.shared.revoke(&previous).await;
        }

        log_ws!(Level::INFO, "User data stream started");
        Ok(id)
    }

    /// Stop every stream, the user-data stream included
    pub async fn close_all(&self) {
        let ids: Vec<StreamId> = {
            let state = self.shared.state.lock().await;
            let mut ids: Vec<StreamId> = state.sessions.keys().cloned().collect();
            if let Some(key) = &state.auth.listen_key {
                if !state.sessions.contains_key(key) {
                    ids.push(key.clone());
                }
            }
            ids
        };

        log_ws!(Level::INFO, streams = ids.len(), "Closing all streams");
        for id in &ids {
            self.stop_stream(id).await;
        }

        self.shared.state.lock().await.sessions.clear();
    }

    /// Registered identifiers, live or terminated
    pub async fn stream_ids(&self) -> Vec<StreamId> {
        self.shared.state.lock().await.sessions.keys().cloned().collect()
    }

    pub async fn is_live(&self, id: &StreamId) -> bool {
        let state = self.shared.state.lock().await;
        state.sessions.get(id).is_some_and(ConnectionSession::is_live)
    }

    pub async fn session_state(&self, id: &StreamId) -> Option<SessionState> {
        let state = self.shared.state.lock().await;
        state.sessions.get(id).map(ConnectionSession::state)
    }

    /// Follow state changes of `id`, e.g. to learn about `Terminated`
    pub async fn watch_state(&self, id: &StreamId) -> Option<watch::Receiver<SessionState>> {
        let state = self.shared.state.lock().await;
        state.sessions.get(id).map(ConnectionSession::subscribe)
    }

    /// Identifier of the active user-data stream
    pub async fn user_listen_key(&self) -> Option<StreamId> {
        self.shared.state.lock().await.auth.listen_key.clone()
    }

    pub async fn user_handler(&self) -> Option<SharedHandler> {
        self.shared.state.lock().await.auth.handler.clone()
    }

    /// Listen key renewal is scheduled
    pub async fn renewal_armed(&self) -> bool {
        let state = self.shared.state.lock().await;
        state
            .auth
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    pub fn metrics(&self) -> &Arc<StreamMetrics> {
        &self.shared.metrics
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        // Sessions signal their own shutdown when `Shared` goes away
        if let Ok(mut state) = self.shared.state.try_lock() {
            if let Some(timer) = state.auth.timer.take() {
                timer.abort();
            }
        }
    }
}

impl Shared {
    async fn start_locked(&self, state: &mut ManagerState, id: StreamId, handler: SharedHandler) {
        if let Some(existing) = state.sessions.get(&id) {
            if existing.is_live() {
                log_ws!(Level::DEBUG, stream = %id, "Stream already running");
                return;
            }
        }
        if let Some(mut finished) = state.sessions.remove(&id) {
            log_ws!(Level::INFO, stream = %id, "Restarting finished stream");
            finished.cancel().await;
        }

        let mut session = ConnectionSession::new(
            id.clone(),
            handler,
            Arc::clone(&self.connector),
            Arc::clone(&self.config),
            Arc::clone(&self.metrics),
        );
        session.start();
        state.sessions.insert(id, session);
    }

    /// Returns the listen key to revoke when `id` was the user-data stream
    async fn stop_locked(&self, state: &mut ManagerState, id: &StreamId) -> Option<StreamId> {
        if let Some(mut session) = state.sessions.remove(id) {
            session.cancel().await;
            log_ws!(Level::INFO, stream = %id, "Stream stopped");
        }

        if state.auth.listen_key.as_ref() != Some(id) {
            return None;
        }
        if let Some(timer) = state.auth.timer.take() {
            timer.abort();
            let _ = timer.await;
        }
        state.auth.handler = None;
        state.auth.listen_key.take()
    }

    async fn revoke(&self, key: &StreamId) {
        if let Err(e) = self.credentials.revoke_key(key.name()).await {
            log_ws!(Level::WARN, error = %e, "Failed to revoke listen key");
        }
    }

    /// One renewal cycle; moves the user stream when the key changes
    async fn renew_user_stream(&self) {
        let current = match self.state.lock().await.auth.listen_key.clone() {
            Some(current) => current,
            None => return,
        };

        // No lock across the REST call
        let fresh = match self.credentials.renew_key(current.name()).await {
            Ok(fresh) => fresh,
            Err(e) => {
                log_ws!(Level::WARN, error = %e, "Listen key renewal failed, retrying next cycle");
                return;
            }
        };
        if fresh == current.name() {
            log_ws!(Level::DEBUG, "Listen key renewed");
            return;
        }

        let mut state = self.state.lock().await;
        // Stopped or replaced while renewing
        if state.auth.listen_key.as_ref() != Some(&current) {
            return;
        }
        let handler = match state.auth.handler.clone() {
            Some(handler) => handler,
            None => return,
        };

        if let Some(mut old) = state.sessions.remove(&current) {
            old.cancel().await;
        }
        let fresh = StreamId::listen_key(fresh);
        self.start_locked(&mut state, fresh.clone(), handler).await;
        state.auth.listen_key = Some(fresh);

        drop(state);

        self.metrics.record_key_rotation();
        log_ws!(Level::INFO, "Listen key rotated, user data stream moved");
        self.revoke(&current).await;
    }
}

/// Renewal timer; ends once the manager is gone
async fn renewal_loop(shared: Weak<Shared>, interval: Duration) {
    loop {
        sleep(interval).await;
        match shared.upgrade() {
            Some(shared) => shared.renew_user_stream().await,
            None => return,
        }
    }
}
