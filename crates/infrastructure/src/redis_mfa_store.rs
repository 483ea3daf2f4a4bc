//! Redis-backed MFA tickets and pending enrolment secrets.
//!
//! Keys: `mfa_ticket:<id>` binds a login to its MFA verify step,
//! `mfa_pending:<user>` parks an encrypted secret awaiting confirmation,
//! and `mfa_pending_attempts:<user>` counts failed confirmations.

use async_trait::async_trait;
use chrono::Duration;
use lodge_application::{MfaTicketStore, PendingMfaStore};
use lodge_core::{AppError, AppResult};
use lodge_domain::UserId;
use redis::{AsyncCommands, Script};

const TICKET_PREFIX: &str = "mfa_ticket:";
const PENDING_PREFIX: &str = "mfa_pending:";
const ATTEMPTS_PREFIX: &str = "mfa_pending_attempts:";

// INCR that starts the TTL clock on first use only.
const INCREMENT_ATTEMPTS_SCRIPT: &str = r#"
local key = KEYS[1]
local ttl = tonumber(ARGV[1])
local count = redis.call('INCR', key)
if count == 1 then
  redis.call('EXPIRE', key, ttl)
end
return count
"#;

/// Redis implementation of the MFA ticket and pending-secret ports.
#[derive(Clone)]
pub struct RedisMfaStore {
    client: redis::Client,
}

impl RedisMfaStore {
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

fn ttl_seconds(ttl: Duration, what: &str) -> AppResult<u64> {
    u64::try_from(ttl.num_seconds())
        .ok()
        .filter(|seconds| *seconds > 0)
        .ok_or_else(|| AppError::Validation(format!("{what} TTL must be positive")))
}

#[async_trait]
impl MfaTicketStore for RedisMfaStore {
    async fn store(&self, ticket: &str, user_id: UserId, ttl: Duration) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection
            .set_ex::<_, _, ()>(
                format!("{TICKET_PREFIX}{ticket}"),
                user_id.to_string(),
                ttl_seconds(ttl, "mfa ticket")?,
            )
            .await
            .map_err(|error| AppError::Internal(format!("failed to store mfa ticket: {error}")))
    }

    async fn consume(&self, ticket: &str) -> AppResult<Option<UserId>> {
        let mut connection = self.connection().await?;
        // GETDEL gives single-use semantics in one atomic command.
        let raw: Option<String> = connection
            .get_del(format!("{TICKET_PREFIX}{ticket}"))
            .await
            .map_err(|error| AppError::Internal(format!("failed to consume mfa ticket: {error}")))?;

        match raw {
            Some(raw) => Ok(Some(raw.parse().map_err(|_| {
                AppError::Internal(format!("malformed user id '{raw}' in mfa ticket"))
            })?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PendingMfaStore for RedisMfaStore {
    async fn store(&self, user_id: UserId, secret_enc: &[u8], ttl: Duration) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let ttl = ttl_seconds(ttl, "pending mfa secret")?;
        connection
            .set_ex::<_, _, ()>(format!("{PENDING_PREFIX}{user_id}"), secret_enc, ttl)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to store pending mfa secret: {error}"))
            })?;
        // A fresh enrolment starts with a clean attempt counter.
        connection
            .del::<_, ()>(format!("{ATTEMPTS_PREFIX}{user_id}"))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to reset mfa attempt counter: {error}"))
            })
    }

    async fn take(&self, user_id: UserId) -> AppResult<Option<Vec<u8>>> {
        let mut connection = self.connection().await?;
        connection
            .get_del(format!("{PENDING_PREFIX}{user_id}"))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to take pending mfa secret: {error}"))
            })
    }

    async fn restore(&self, user_id: UserId, secret_enc: &[u8], ttl: Duration) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection
            .set_ex::<_, _, ()>(
                format!("{PENDING_PREFIX}{user_id}"),
                secret_enc,
                ttl_seconds(ttl, "pending mfa secret")?,
            )
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to restore pending mfa secret: {error}"))
            })
    }

    async fn increment_attempts(&self, user_id: UserId, ttl: Duration) -> AppResult<u32> {
        let mut connection = self.connection().await?;
        let script = Script::new(INCREMENT_ATTEMPTS_SCRIPT);
        let count: i64 = script
            .key(format!("{ATTEMPTS_PREFIX}{user_id}"))
            .arg(ttl_seconds(ttl, "mfa attempt counter")?)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to count mfa attempt: {error}"))
            })?;
        u32::try_from(count)
            .map_err(|error| AppError::Internal(format!("invalid mfa attempt count: {error}")))
    }

    async fn clear(&self, user_id: UserId) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection
            .del::<_, ()>(&[
                format!("{PENDING_PREFIX}{user_id}"),
                format!("{ATTEMPTS_PREFIX}{user_id}"),
            ])
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to clear pending mfa state: {error}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_counter_script_sets_ttl_once() {
        assert!(INCREMENT_ATTEMPTS_SCRIPT.contains("INCR"));
        assert!(INCREMENT_ATTEMPTS_SCRIPT.contains("count == 1"));
    }

    #[test]
    fn ttls_must_be_positive() {
        assert!(ttl_seconds(Duration::zero(), "x").is_err());
        assert_eq!(ttl_seconds(Duration::minutes(5), "x").ok(), Some(300));
    }
}
