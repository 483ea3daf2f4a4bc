//! PostgreSQL-backed server membership.

use async_trait::async_trait;
use sqlx::PgPool;

use lodge_application::MemberRepository;
use lodge_core::{AppError, AppResult};
use lodge_domain::{Member, MemberStatus, RoleId, UserId};

/// PostgreSQL implementation of the member repository port.
#[derive(Clone)]
pub struct PostgresMemberRepository {
    pool: PgPool,
}

impl PostgresMemberRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    user_id: uuid::Uuid,
    status: String,
    nickname: Option<String>,
    timeout_until: Option<chrono::DateTime<chrono::Utc>>,
    joined_at: chrono::DateTime<chrono::Utc>,
    role_ids: Vec<uuid::Uuid>,
}

impl MemberRow {
    fn into_member(self) -> AppResult<Member> {
        Ok(Member {
            user_id: UserId::from_uuid(self.user_id),
            status: MemberStatus::parse(&self.status)?,
            nickname: self.nickname,
            timeout_until: self.timeout_until,
            role_ids: self.role_ids.into_iter().map(RoleId::from_uuid).collect(),
            joined_at: self.joined_at,
        })
    }
}

const MEMBER_QUERY: &str = r#"
SELECT m.user_id, m.status, m.nickname, m.timeout_until, m.joined_at,
       COALESCE(ARRAY_AGG(mr.role_id) FILTER (WHERE mr.role_id IS NOT NULL), '{}') AS role_ids
FROM members m
LEFT JOIN member_roles mr ON mr.user_id = m.user_id
"#;

#[async_trait]
impl MemberRepository for PostgresMemberRepository {
    async fn get(&self, user_id: UserId) -> AppResult<Option<Member>> {
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "{MEMBER_QUERY} WHERE m.user_id = $1 GROUP BY m.user_id"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load member: {error}")))?;

        row.map(MemberRow::into_member).transpose()
    }

    async fn list(&self) -> AppResult<Vec<Member>> {
        let rows = sqlx::query_as::<_, MemberRow>(&format!(
            "{MEMBER_QUERY} GROUP BY m.user_id ORDER BY m.joined_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list members: {error}")))?;

        rows.into_iter().map(MemberRow::into_member).collect()
    }

    async fn list_user_ids(&self, include_pending: bool) -> AppResult<Vec<UserId>> {
        let rows = sqlx::query_scalar::<_, uuid::Uuid>(
            "SELECT user_id FROM members WHERE $1 OR status <> 'pending'",
        )
        .bind(include_pending)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list member ids: {error}")))?;
        Ok(rows.into_iter().map(UserId::from_uuid).collect())
    }

    async fn add(&self, user_id: UserId, status: MemberStatus) -> AppResult<Member> {
        sqlx::query("INSERT INTO members (user_id, status) VALUES ($1, $2)")
            .bind(user_id.as_uuid())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                if let sqlx::Error::Database(ref database_error) = error
                    && database_error.code().as_deref() == Some("23505")
                {
                    return AppError::Conflict("already a member".to_owned());
                }
                AppError::Internal(format!("failed to add member: {error}"))
            })?;

        self.get(user_id)
            .await?
            .ok_or_else(|| AppError::Internal("member vanished after insert".to_owned()))
    }

    async fn update_nickname(&self, user_id: UserId, nickname: Option<&str>) -> AppResult<()> {
        let updated = sqlx::query("UPDATE members SET nickname = $2 WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .bind(nickname)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to update nickname: {error}"))
            })?;
        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("member not found".to_owned()));
        }
        Ok(())
    }

    async fn set_timeout(
        &self,
        user_id: UserId,
        until: Option<chrono::DateTime<chrono::Utc>>,
    ) -> AppResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE members
            SET timeout_until = $2,
                status = CASE WHEN $2 IS NULL THEN 'active' ELSE 'timed_out' END
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(until)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to set timeout: {error}")))?;
        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("member not found".to_owned()));
        }
        Ok(())
    }

    async fn remove(&self, user_id: UserId) -> AppResult<()> {
        sqlx::query("DELETE FROM members WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to remove member: {error}")))?;
        Ok(())
    }

    async fn ban(&self, user_id: UserId) -> AppResult<()> {
        sqlx::query("INSERT INTO bans (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to record ban: {error}")))?;
        Ok(())
    }

    async fn unban(&self, user_id: UserId) -> AppResult<()> {
        sqlx::query("DELETE FROM bans WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to lift ban: {error}")))?;
        Ok(())
    }

    async fn is_banned(&self, user_id: UserId) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM bans WHERE user_id = $1)")
            .bind(user_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to check ban: {error}")))
    }
}
