//! PostgreSQL-backed user repository.

use async_trait::async_trait;
use sqlx::PgPool;

use lodge_application::{NewUser, TombstoneEntry, UserRecord, UserRepository};
use lodge_core::{AppError, AppResult};
use lodge_domain::{UserId, UserProfile};

/// PostgreSQL implementation of the user repository port.
#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: uuid::Uuid,
    email: String,
    username: String,
    email_verified: bool,
    password_hash: String,
    mfa_enabled: bool,
    totp_secret_enc: Option<Vec<u8>>,
    display_name: Option<String>,
    avatar_key: Option<String>,
    banner_key: Option<String>,
    pronouns: Option<String>,
    about: Option<String>,
    theme_primary: Option<i32>,
    theme_accent: Option<i32>,
    created_at: chrono::DateTime<chrono::Utc>,
}

const USER_COLUMNS: &str = "id, email, username, email_verified, password_hash, mfa_enabled, \
     totp_secret_enc, display_name, avatar_key, banner_key, pronouns, about, \
     theme_primary, theme_accent, created_at";

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_uuid(row.id),
            email: row.email,
            username: row.username,
            email_verified: row.email_verified,
            password_hash: row.password_hash,
            mfa_enabled: row.mfa_enabled,
            totp_secret_enc: row.totp_secret_enc,
            profile: UserProfile {
                display_name: row.display_name,
                avatar_key: row.avatar_key,
                banner_key: row.banner_key,
                pronouns: row.pronouns,
                about: row.about,
                theme_primary: row.theme_primary.map(|value| value as u32),
                theme_accent: row.theme_accent.map(|value| value as u32),
            },
            created_at: row.created_at,
        }
    }
}

fn map_unique_violation(error: sqlx::Error, conflict_message: &str) -> AppError {
    if let sqlx::Error::Database(ref database_error) = error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(conflict_message.to_owned());
    }
    AppError::Internal(format!("user query failed: {error}"))
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = LOWER($1) LIMIT 1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find user by email: {error}")))?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_by_username(&self, username_lower: &str) -> AppResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username_lower = LOWER($1) LIMIT 1"
        ))
        .bind(username_lower)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find user by username: {error}"))
        })?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_by_id(&self, user_id: UserId) -> AppResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 LIMIT 1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find user by id: {error}")))?;

        Ok(row.map(UserRecord::from))
    }

    async fn create_with_verification(
        &self,
        new_user: &NewUser,
        token_hash: &str,
        token_expires_at: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<UserId> {
        let mut tx = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to open transaction: {error}"))
        })?;

        let id = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            INSERT INTO users (email, username, username_lower, password_hash)
            VALUES (LOWER($1), $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.username_lower)
        .bind(&new_user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|error| map_unique_violation(error, "email or username is already taken"))?;

        sqlx::query(
            r#"
            INSERT INTO email_verifications (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .bind(token_expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to insert verification row: {error}"))
        })?;

        tx.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit registration: {error}"))
        })?;

        Ok(UserId::from_uuid(id))
    }

    async fn update_password_hash(&self, user_id: UserId, password_hash: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id.as_uuid())
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to update password hash: {error}"))
            })?;
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: UserId) -> AppResult<()> {
        sqlx::query("UPDATE users SET email_verified = TRUE WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to mark email verified: {error}"))
            })?;
        Ok(())
    }

    async fn enable_mfa(
        &self,
        user_id: UserId,
        totp_secret_enc: &[u8],
        recovery_code_hashes: &[String],
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to open transaction: {error}"))
        })?;

        sqlx::query(
            "UPDATE users SET mfa_enabled = TRUE, totp_secret_enc = $2 WHERE id = $1",
        )
        .bind(user_id.as_uuid())
        .bind(totp_secret_enc)
        .execute(&mut *tx)
        .await
        .map_err(|error| AppError::Internal(format!("failed to enable mfa: {error}")))?;

        sqlx::query("DELETE FROM mfa_recovery_codes WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to clear recovery codes: {error}"))
            })?;

        for code_hash in recovery_code_hashes {
            sqlx::query("INSERT INTO mfa_recovery_codes (user_id, code_hash) VALUES ($1, $2)")
                .bind(user_id.as_uuid())
                .bind(code_hash)
                .execute(&mut *tx)
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to insert recovery code: {error}"))
                })?;
        }

        tx.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit mfa enablement: {error}"))
        })
    }

    async fn disable_mfa(&self, user_id: UserId) -> AppResult<()> {
        let mut tx = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to open transaction: {error}"))
        })?;

        sqlx::query(
            "UPDATE users SET mfa_enabled = FALSE, totp_secret_enc = NULL WHERE id = $1",
        )
        .bind(user_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|error| AppError::Internal(format!("failed to disable mfa: {error}")))?;

        sqlx::query("DELETE FROM mfa_recovery_codes WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to clear recovery codes: {error}"))
            })?;

        tx.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit mfa disablement: {error}"))
        })
    }

    async fn update_profile(&self, user_id: UserId, profile: &UserProfile) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET display_name = $2, avatar_key = $3, banner_key = $4, pronouns = $5,
                about = $6, theme_primary = $7, theme_accent = $8
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(&profile.display_name)
        .bind(&profile.avatar_key)
        .bind(&profile.banner_key)
        .bind(&profile.pronouns)
        .bind(&profile.about)
        .bind(profile.theme_primary.map(|value| value as i32))
        .bind(profile.theme_accent.map(|value| value as i32))
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update profile: {error}")))?;
        Ok(())
    }

    async fn delete_with_tombstones(
        &self,
        user_id: UserId,
        tombstones: &[TombstoneEntry],
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to open transaction: {error}"))
        })?;

        for tombstone in tombstones {
            sqlx::query(
                r#"
                INSERT INTO deletion_tombstones (identifier_type, identifier_hmac)
                VALUES ($1, $2)
                ON CONFLICT (identifier_type, identifier_hmac) DO NOTHING
                "#,
            )
            .bind(tombstone.kind.as_str())
            .bind(&tombstone.identifier_hmac)
            .execute(&mut *tx)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to insert tombstone: {error}"))
            })?;
        }

        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|error| AppError::Internal(format!("failed to delete user: {error}")))?;

        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound("user not found".to_owned()));
        }

        tx.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit account deletion: {error}"))
        })
    }
}
