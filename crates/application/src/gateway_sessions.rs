//! Gateway session persistence port.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;

use lodge_core::{AppError, AppResult};
use lodge_domain::{SessionId, UserId};

/// Persistent per-session state shared by every gateway process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Owner of the session.
    pub user_id: UserId,
    /// Highest sequence number assigned to the session.
    pub last_seq: u64,
}

/// Store port for gateway sessions and their replay buffers.
///
/// Sessions live in the shared coordination store so a client can resume
/// against any process after failover. The replay buffer is bounded;
/// appending past the cap evicts the oldest entry.
#[async_trait]
pub trait GatewaySessionStore: Send + Sync {
    /// Registers a new session.
    async fn create(&self, session_id: &SessionId, user_id: UserId, ttl: Duration)
    -> AppResult<()>;

    /// Loads a session, if it is still alive.
    async fn load(&self, session_id: &SessionId) -> AppResult<Option<SessionRecord>>;

    /// Atomically assigns the next sequence number, appends the payload to
    /// the replay buffer (evicting past the cap), and refreshes TTLs.
    async fn append_event(
        &self,
        session_id: &SessionId,
        payload: &Value,
        ttl: Duration,
    ) -> AppResult<u64>;

    /// Returns buffered `(seq, payload)` entries with `seq > last_seen`,
    /// in sequence order.
    async fn replay_after(
        &self,
        session_id: &SessionId,
        last_seen: u64,
    ) -> AppResult<Vec<(u64, Value)>>;

    /// Refreshes the session and buffer TTLs.
    async fn touch(&self, session_id: &SessionId, ttl: Duration) -> AppResult<()>;

    /// Drops the session and its buffer (explicit client disconnect).
    async fn delete(&self, session_id: &SessionId) -> AppResult<()>;
}

/// Mints a fresh opaque session id.
pub fn mint_session_id() -> AppResult<SessionId> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes)
        .map_err(|error| AppError::Internal(format!("failed to mint session id: {error}")))?;

    use std::fmt::Write;
    let id = bytes.iter().fold(String::with_capacity(32), |mut acc, byte| {
        let _ = write!(acc, "{byte:02x}");
        acc
    });
    Ok(SessionId::from_string(id))
}

#[cfg(test)]
mod tests {
    use super::mint_session_id;

    #[test]
    fn session_ids_are_32_hex_chars() {
        let id = match mint_session_id() {
            Ok(id) => id,
            Err(error) => panic!("minting failed: {error}"),
        };
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
