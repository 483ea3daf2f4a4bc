//! PostgreSQL-backed roles and role assignment.

use async_trait::async_trait;
use sqlx::PgPool;

use lodge_application::{RoleRepository, RoleUpdate};
use lodge_core::{AppError, AppResult};
use lodge_domain::{Permissions, Role, RoleId, UserId};

/// PostgreSQL implementation of the role repository port.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RoleRow {
    id: uuid::Uuid,
    name: String,
    permissions: i64,
    position: i32,
    color: Option<i32>,
    is_everyone: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: RoleId::from_uuid(row.id),
            name: row.name,
            permissions: Permissions::from_bits(row.permissions as u64),
            position: row.position,
            color: row.color.map(|value| value as u32),
            is_everyone: row.is_everyone,
            created_at: row.created_at,
        }
    }
}

const ROLE_COLUMNS: &str = "id, name, permissions, position, color, is_everyone, created_at";

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn create(
        &self,
        name: &str,
        permissions: Permissions,
        position: i32,
        color: Option<u32>,
    ) -> AppResult<Role> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            r#"
            INSERT INTO roles (name, permissions, position, color)
            VALUES ($1, $2, $3, $4)
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(permissions.bits() as i64)
        .bind(position)
        .bind(color.map(|value| value as i32))
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create role: {error}")))?;
        Ok(row.into())
    }

    async fn get(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 LIMIT 1"
        ))
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role: {error}")))?;
        Ok(row.map(Role::from))
    }

    async fn list(&self) -> AppResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles ORDER BY position DESC, created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn update(&self, role_id: RoleId, update: &RoleUpdate) -> AppResult<Role> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            r#"
            UPDATE roles
            SET name = COALESCE($2, name),
                permissions = COALESCE($3, permissions),
                position = COALESCE($4, position),
                color = CASE WHEN $5 THEN $6 ELSE color END
            WHERE id = $1
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(role_id.as_uuid())
        .bind(&update.name)
        .bind(update.permissions.map(|permissions| permissions.bits() as i64))
        .bind(update.position)
        .bind(update.color.is_some())
        .bind(update.color.flatten().map(|value| value as i32))
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update role: {error}")))?
        .ok_or_else(|| AppError::NotFound("role not found".to_owned()))?;
        Ok(row.into())
    }

    async fn delete(&self, role_id: RoleId) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM roles WHERE id = $1 AND NOT is_everyone")
            .bind(role_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to delete role: {error}")))?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound("role not found".to_owned()));
        }
        Ok(())
    }

    async fn assign(&self, user_id: UserId, role_id: RoleId) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO member_roles (user_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, role_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(role_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to assign role: {error}")))?;
        Ok(())
    }

    async fn unassign(&self, user_id: UserId, role_id: RoleId) -> AppResult<()> {
        sqlx::query("DELETE FROM member_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id.as_uuid())
            .bind(role_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to unassign role: {error}")))?;
        Ok(())
    }
}
