//! Redis-backed gateway sessions and replay buffers.
//!
//! `gateway_session:<id>` is a hash of `{user_id, last_seq}`;
//! `gateway_replay:<id>` is an ordered list of `<seq>:<payload-json>`
//! entries, trimmed to the configured cap. Sequence assignment and the
//! buffer append are one Lua script so concurrent dispatchers can never
//! duplicate or skip a sequence number.

use async_trait::async_trait;
use chrono::Duration;
use lodge_application::{GatewaySessionStore, SessionRecord};
use lodge_core::{AppError, AppResult};
use lodge_domain::{SessionId, UserId};
use redis::{AsyncCommands, Script};
use serde_json::Value;

const SESSION_PREFIX: &str = "gateway_session:";
const REPLAY_PREFIX: &str = "gateway_replay:";

const APPEND_EVENT_SCRIPT: &str = r#"
local session_key = KEYS[1]
local replay_key = KEYS[2]
local ttl = tonumber(ARGV[1])
local cap = tonumber(ARGV[2])
local payload = ARGV[3]

if redis.call('EXISTS', session_key) == 0 then
  return -1
end

local seq = redis.call('HINCRBY', session_key, 'last_seq', 1)
redis.call('RPUSH', replay_key, seq .. ':' .. payload)
redis.call('LTRIM', replay_key, -cap, -1)
redis.call('EXPIRE', session_key, ttl)
redis.call('EXPIRE', replay_key, ttl)
return seq
"#;

/// Redis implementation of the gateway session store.
#[derive(Clone)]
pub struct RedisGatewaySessionStore {
    client: redis::Client,
    replay_capacity: usize,
}

impl RedisGatewaySessionStore {
    /// Creates a store; `replay_capacity` bounds each session's buffer.
    #[must_use]
    pub fn new(client: redis::Client, replay_capacity: usize) -> Self {
        Self {
            client,
            replay_capacity,
        }
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

fn ttl_seconds(ttl: Duration) -> AppResult<i64> {
    let seconds = ttl.num_seconds();
    if seconds <= 0 {
        return Err(AppError::Validation(
            "gateway session TTL must be positive".to_owned(),
        ));
    }
    Ok(seconds)
}

fn parse_replay_entry(raw: &str) -> AppResult<(u64, Value)> {
    let Some((seq, payload)) = raw.split_once(':') else {
        return Err(AppError::Internal(format!(
            "malformed replay entry '{raw}'"
        )));
    };
    let seq: u64 = seq
        .parse()
        .map_err(|_| AppError::Internal(format!("malformed replay sequence '{seq}'")))?;
    let payload: Value = serde_json::from_str(payload)
        .map_err(|error| AppError::Internal(format!("malformed replay payload: {error}")))?;
    Ok((seq, payload))
}

#[async_trait]
impl GatewaySessionStore for RedisGatewaySessionStore {
    async fn create(
        &self,
        session_id: &SessionId,
        user_id: UserId,
        ttl: Duration,
    ) -> AppResult<()> {
        let ttl = ttl_seconds(ttl)?;
        let key = format!("{SESSION_PREFIX}{session_id}");

        let mut connection = self.connection().await?;
        connection
            .hset_multiple::<_, _, _, ()>(
                &key,
                &[("user_id", user_id.to_string()), ("last_seq", "0".to_owned())],
            )
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to create gateway session: {error}"))
            })?;
        connection
            .expire::<_, ()>(&key, ttl)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to set gateway session TTL: {error}"))
            })
    }

    async fn load(&self, session_id: &SessionId) -> AppResult<Option<SessionRecord>> {
        let mut connection = self.connection().await?;
        let fields: std::collections::HashMap<String, String> = connection
            .hgetall(format!("{SESSION_PREFIX}{session_id}"))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to load gateway session: {error}"))
            })?;

        if fields.is_empty() {
            return Ok(None);
        }

        let user_id: UserId = fields
            .get("user_id")
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| AppError::Internal("session is missing its user id".to_owned()))?;
        let last_seq: u64 = fields
            .get("last_seq")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);

        Ok(Some(SessionRecord { user_id, last_seq }))
    }

    async fn append_event(
        &self,
        session_id: &SessionId,
        payload: &Value,
        ttl: Duration,
    ) -> AppResult<u64> {
        let encoded = serde_json::to_string(payload).map_err(|error| {
            AppError::Internal(format!("failed to encode replay payload: {error}"))
        })?;

        let mut connection = self.connection().await?;
        let script = Script::new(APPEND_EVENT_SCRIPT);
        let seq: i64 = script
            .key(format!("{SESSION_PREFIX}{session_id}"))
            .key(format!("{REPLAY_PREFIX}{session_id}"))
            .arg(ttl_seconds(ttl)?)
            .arg(self.replay_capacity)
            .arg(encoded)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to append gateway event: {error}"))
            })?;

        if seq < 0 {
            return Err(AppError::NotFound(format!(
                "gateway session '{session_id}' has expired"
            )));
        }
        u64::try_from(seq)
            .map_err(|error| AppError::Internal(format!("invalid sequence number: {error}")))
    }

    async fn replay_after(
        &self,
        session_id: &SessionId,
        last_seen: u64,
    ) -> AppResult<Vec<(u64, Value)>> {
        let mut connection = self.connection().await?;
        let entries: Vec<String> = connection
            .lrange(format!("{REPLAY_PREFIX}{session_id}"), 0, -1)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read replay buffer: {error}"))
            })?;

        let mut replay = Vec::new();
        for raw in entries {
            let (seq, payload) = parse_replay_entry(&raw)?;
            if seq > last_seen {
                replay.push((seq, payload));
            }
        }
        Ok(replay)
    }

    async fn touch(&self, session_id: &SessionId, ttl: Duration) -> AppResult<()> {
        let ttl = ttl_seconds(ttl)?;
        let mut connection = self.connection().await?;
        connection
            .expire::<_, ()>(format!("{SESSION_PREFIX}{session_id}"), ttl)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to refresh session TTL: {error}"))
            })?;
        connection
            .expire::<_, ()>(format!("{REPLAY_PREFIX}{session_id}"), ttl)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to refresh replay TTL: {error}"))
            })
    }

    async fn delete(&self, session_id: &SessionId) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection
            .del::<_, ()>(&[
                format!("{SESSION_PREFIX}{session_id}"),
                format!("{REPLAY_PREFIX}{session_id}"),
            ])
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete gateway session: {error}"))
            })
    }
}
