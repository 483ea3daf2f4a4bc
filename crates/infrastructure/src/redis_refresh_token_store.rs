//! Redis-backed rotating refresh-token families.
//!
//! Keys: `refresh:<token>` holds the owning user id with the family TTL,
//! `user_refresh:<user>` is the set of the user's live token ids, and
//! `refresh_used:<token>` marks a consumed id for the family TTL so a
//! replay is distinguishable from an expired token. All multi-key
//! transitions run as Lua scripts, making rotation linearisable per
//! token id.

use async_trait::async_trait;
use chrono::Duration;
use lodge_application::{RefreshTokenStore, RotateStatus};
use lodge_core::{AppError, AppResult};
use lodge_domain::UserId;
use redis::Script;

const TOKEN_PREFIX: &str = "refresh:";
const SET_PREFIX: &str = "user_refresh:";
const USED_PREFIX: &str = "refresh_used:";

// Registers the new id and sweeps set entries whose backing key expired.
const CREATE_SCRIPT: &str = r#"
local token_key = KEYS[1]
local set_key = KEYS[2]
local user_id = ARGV[1]
local ttl = tonumber(ARGV[2])
local token_prefix = ARGV[3]
local token = ARGV[4]

redis.call('SET', token_key, user_id, 'EX', ttl)
local members = redis.call('SMEMBERS', set_key)
for _, member in ipairs(members) do
  if redis.call('EXISTS', token_prefix .. member) == 0 then
    redis.call('SREM', set_key, member)
  end
end
redis.call('SADD', set_key, token)
redis.call('EXPIRE', set_key, ttl)
return 1
"#;

// Single-shot rotation: consume the old id, mark it used, sweep, install
// the successor. Returns {status, user_id}.
const ROTATE_SCRIPT: &str = r#"
local old_key = KEYS[1]
local new_key = KEYS[2]
local used_key = KEYS[3]
local token_prefix = ARGV[1]
local set_prefix = ARGV[2]
local ttl = tonumber(ARGV[3])
local old_token = ARGV[4]
local new_token = ARGV[5]

local user_id = redis.call('GET', old_key)
if not user_id then
  local reused_by = redis.call('GET', used_key)
  if reused_by then
    return {'reused', reused_by}
  end
  return {'not_found', ''}
end

local set_key = set_prefix .. user_id
redis.call('DEL', old_key)
redis.call('SET', used_key, user_id, 'EX', ttl)
redis.call('SREM', set_key, old_token)
local members = redis.call('SMEMBERS', set_key)
for _, member in ipairs(members) do
  if redis.call('EXISTS', token_prefix .. member) == 0 then
    redis.call('SREM', set_key, member)
  end
end
redis.call('SET', new_key, user_id, 'EX', ttl)
redis.call('SADD', set_key, new_token)
redis.call('EXPIRE', set_key, ttl)
return {'rotated', user_id}
"#;

const REVOKE_ALL_SCRIPT: &str = r#"
local set_key = KEYS[1]
local token_prefix = ARGV[1]
local members = redis.call('SMEMBERS', set_key)
local revoked = 0
for _, member in ipairs(members) do
  revoked = revoked + redis.call('DEL', token_prefix .. member)
end
redis.call('DEL', set_key)
return revoked
"#;

/// Redis implementation of the refresh-token store port.
#[derive(Clone)]
pub struct RedisRefreshTokenStore {
    client: redis::Client,
}

impl RedisRefreshTokenStore {
    /// Creates a store with a configured Redis client.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
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
            "refresh token TTL must be positive".to_owned(),
        ));
    }
    Ok(seconds)
}

#[async_trait]
impl RefreshTokenStore for RedisRefreshTokenStore {
    async fn create(&self, user_id: UserId, token: &str, ttl: Duration) -> AppResult<()> {
        let mut connection = self.connection().await?;

        let script = Script::new(CREATE_SCRIPT);
        let _: i64 = script
            .key(format!("{TOKEN_PREFIX}{token}"))
            .key(format!("{SET_PREFIX}{user_id}"))
            .arg(user_id.to_string())
            .arg(ttl_seconds(ttl)?)
            .arg(TOKEN_PREFIX)
            .arg(token)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to register refresh token: {error}"))
            })?;
        Ok(())
    }

    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        ttl: Duration,
    ) -> AppResult<RotateStatus> {
        let mut connection = self.connection().await?;

        let script = Script::new(ROTATE_SCRIPT);
        let (status, user_id): (String, String) = script
            .key(format!("{TOKEN_PREFIX}{old_token}"))
            .key(format!("{TOKEN_PREFIX}{new_token}"))
            .key(format!("{USED_PREFIX}{old_token}"))
            .arg(TOKEN_PREFIX)
            .arg(SET_PREFIX)
            .arg(ttl_seconds(ttl)?)
            .arg(old_token)
            .arg(new_token)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to rotate refresh token: {error}"))
            })?;

        match status.as_str() {
            "rotated" => Ok(RotateStatus::Rotated {
                user_id: parse_user_id(&user_id)?,
            }),
            "reused" => Ok(RotateStatus::Reused {
                user_id: parse_user_id(&user_id).ok(),
            }),
            "not_found" => Ok(RotateStatus::NotFound),
            other => Err(AppError::Internal(format!(
                "unexpected rotation status '{other}'"
            ))),
        }
    }

    async fn revoke_all(&self, user_id: UserId) -> AppResult<u64> {
        let mut connection = self.connection().await?;

        let script = Script::new(REVOKE_ALL_SCRIPT);
        let revoked: i64 = script
            .key(format!("{SET_PREFIX}{user_id}"))
            .arg(TOKEN_PREFIX)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to revoke refresh tokens: {error}"))
            })?;
        Ok(u64::try_from(revoked).unwrap_or(0))
    }
}

fn parse_user_id(raw: &str) -> AppResult<UserId> {
    raw.parse()
        .map_err(|_| AppError::Internal(format!("malformed user id '{raw}' in refresh store")))
}

#[cfg(test)]
mod tests {
    use super::*;

    // The scripts are the contract; these assertions pin the parts the
    // invariants depend on without a live Redis.

    #[test]
    fn rotate_script_consumes_before_installing() {
        let delete_position = ROTATE_SCRIPT.find("DEL', old_key");
        let install_position = ROTATE_SCRIPT.find("SET', new_key");
        match (delete_position, install_position) {
            (Some(delete), Some(install)) => assert!(delete < install),
            other => panic!("script is missing its core steps: {other:?}"),
        }
    }

    #[test]
    fn rotate_script_marks_consumed_ids() {
        assert!(ROTATE_SCRIPT.contains("used_key"));
        assert!(ROTATE_SCRIPT.contains("'reused'"));
        assert!(ROTATE_SCRIPT.contains("'not_found'"));
    }

    #[test]
    fn both_write_scripts_sweep_expired_set_members() {
        for script in [CREATE_SCRIPT, ROTATE_SCRIPT] {
            assert!(script.contains("SMEMBERS"));
            assert!(script.contains("EXISTS"));
            assert!(script.contains("SREM"));
        }
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        assert!(ttl_seconds(Duration::zero()).is_err());
        assert!(ttl_seconds(Duration::seconds(-5)).is_err());
        assert_eq!(ttl_seconds(Duration::days(14)).ok(), Some(14 * 24 * 3600));
    }
}
