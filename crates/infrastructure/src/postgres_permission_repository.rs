//! PostgreSQL read-side queries feeding the permission resolver.

use async_trait::async_trait;
use sqlx::PgPool;

use lodge_application::PermissionQueryRepository;
use lodge_core::{AppError, AppResult};
use lodge_domain::{
    ChannelId, MemberStatus, OverrideTarget, PermissionOverride, Permissions, ResolvedRole,
    RoleId, UserId,
};

/// PostgreSQL implementation of the permission query port.
#[derive(Clone)]
pub struct PostgresPermissionRepository {
    pool: PgPool,
}

impl PostgresPermissionRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ResolvedRoleRow {
    id: uuid::Uuid,
    position: i32,
    permissions: i64,
    is_everyone: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct OverrideRow {
    channel_id: uuid::Uuid,
    target_type: String,
    target_id: uuid::Uuid,
    allow: i64,
    deny: i64,
}

#[async_trait]
impl PermissionQueryRepository for PostgresPermissionRepository {
    async fn owner_id(&self) -> AppResult<UserId> {
        let owner = sqlx::query_scalar::<_, uuid::Uuid>(
            "SELECT owner_id FROM server_config LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load server owner: {error}")))?
        .ok_or_else(|| AppError::Internal("server config row is missing".to_owned()))?;
        Ok(UserId::from_uuid(owner))
    }

    async fn member_status(&self, user_id: UserId) -> AppResult<Option<MemberStatus>> {
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM members WHERE user_id = $1 LIMIT 1",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load member status: {error}")))?;

        status.as_deref().map(MemberStatus::parse).transpose()
    }

    async fn roles_for_user(&self, user_id: UserId) -> AppResult<Vec<ResolvedRole>> {
        // One query returns the implicit @everyone row plus assigned roles.
        let rows = sqlx::query_as::<_, ResolvedRoleRow>(
            r#"
            SELECT r.id, r.position, r.permissions, r.is_everyone
            FROM roles r
            WHERE r.is_everyone
               OR r.id IN (SELECT role_id FROM member_roles WHERE user_id = $1)
            ORDER BY r.position
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load user roles: {error}")))?;

        Ok(rows
            .into_iter()
            .map(|row| ResolvedRole {
                id: RoleId::from_uuid(row.id),
                position: row.position,
                permissions: Permissions::from_bits(row.permissions as u64),
                is_everyone: row.is_everyone,
            })
            .collect())
    }

    async fn overrides_for_channel(
        &self,
        channel_id: ChannelId,
    ) -> AppResult<Vec<PermissionOverride>> {
        let rows = sqlx::query_as::<_, OverrideRow>(
            r#"
            SELECT channel_id, target_type, target_id, allow, deny
            FROM permission_overrides WHERE channel_id = $1
            "#,
        )
        .bind(channel_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load channel overrides: {error}"))
        })?;

        rows.into_iter()
            .map(|row| {
                let target = match row.target_type.as_str() {
                    "role" => OverrideTarget::Role(RoleId::from_uuid(row.target_id)),
                    "user" => OverrideTarget::User(UserId::from_uuid(row.target_id)),
                    other => {
                        return Err(AppError::Internal(format!(
                            "unknown override target type '{other}'"
                        )));
                    }
                };
                Ok(PermissionOverride {
                    channel_id: ChannelId::from_uuid(row.channel_id),
                    target,
                    allow: Permissions::from_bits(row.allow as u64),
                    deny: Permissions::from_bits(row.deny as u64),
                })
            })
            .collect()
    }
}
