//! WebSocket gateway: connection registry, hub wiring, and dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message as WsMessage;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use lodge_domain::{SessionId, UserId};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

mod connection;
mod dispatcher;

pub use dispatcher::run_dispatcher;

/// Close code sent when a resume cannot be honoured.
pub const CLOSE_INVALID_SESSION: u16 = 4004;

/// Gateway tunables taken from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Interval between server heartbeats.
    pub heartbeat_interval: std::time::Duration,
    /// How long an unauthenticated connection may idle before close.
    pub identify_window: std::time::Duration,
    /// TTL for session records and replay buffers.
    pub session_ttl: chrono::Duration,
    /// Outbound frame queue depth; a full queue drops the connection.
    pub send_queue: usize,
}

/// Sender half of one connection, owned by the registry.
#[derive(Clone)]
pub struct ConnectionHandle {
    /// Distinguishes reconnects that reuse a session id.
    pub connection_id: u64,
    /// The session's authenticated user.
    pub user_id: UserId,
    /// Queue into the connection's write task.
    pub sender: mpsc::Sender<WsMessage>,
    /// Cancelling this token tears the connection down.
    pub cancel: CancellationToken,
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Mints a process-unique connection id.
#[must_use]
pub fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Sessions connected to this process.
///
/// The dispatcher intersects envelope recipients with this registry;
/// other processes hold their own registries over the same shared
/// session store.
#[derive(Default)]
pub struct GatewayRegistry {
    connections: RwLock<HashMap<String, ConnectionHandle>>,
}

impl GatewayRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a session's connection, replacing (and cancelling) any
    /// previous connection bound to the same session id.
    pub async fn register(&self, session_id: &SessionId, handle: ConnectionHandle) {
        let previous = self
            .connections
            .write()
            .await
            .insert(session_id.as_str().to_owned(), handle);
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }

    /// Removes a session's connection if it is still the registered one.
    pub async fn unregister(&self, session_id: &SessionId, connection_id: u64) {
        let mut connections = self.connections.write().await;
        if let Some(handle) = connections.get(session_id.as_str())
            && handle.connection_id == connection_id
        {
            connections.remove(session_id.as_str());
        }
    }

    /// Returns the locally connected sessions of the given users.
    pub async fn sessions_for(&self, user_ids: &[UserId]) -> Vec<(SessionId, ConnectionHandle)> {
        let connections = self.connections.read().await;
        connections
            .iter()
            .filter(|(_, handle)| user_ids.contains(&handle.user_id))
            .map(|(session_id, handle)| {
                (
                    SessionId::from_string(session_id.clone()),
                    handle.clone(),
                )
            })
            .collect()
    }

    /// Number of locally connected sessions.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// True when no sessions are connected locally.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Cancels every connection; used on shutdown.
    pub async fn close_all(&self) {
        for handle in self.connections.read().await.values() {
            handle.cancel.cancel();
        }
    }
}

/// `GET /api/v1/gateway` upgrades to the gateway protocol.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        connection::run(socket, state).await;
    })
}
