//! Role management and assignment.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use lodge_core::{AppError, AppResult};
use lodge_domain::{
    OutboundEvent, Permissions, RecipientSelector, Role, RoleId, UserId, event_names,
    validate_role_name,
};

use crate::event_service::EventPublisher;
use crate::permission_service::{PermissionInvalidator, PermissionService};

/// Partial update for a role.
#[derive(Debug, Clone, Default)]
pub struct RoleUpdate {
    /// New name, if changing.
    pub name: Option<String>,
    /// New permission bits, if changing.
    pub permissions: Option<Permissions>,
    /// New hierarchy position, if changing.
    pub position: Option<i32>,
    /// New colour; `Some(None)` clears it.
    pub color: Option<Option<u32>>,
}

/// Repository port for roles and role membership.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Inserts a role.
    async fn create(
        &self,
        name: &str,
        permissions: Permissions,
        position: i32,
        color: Option<u32>,
    ) -> AppResult<Role>;

    /// Loads one role.
    async fn get(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Lists roles ordered by position.
    async fn list(&self) -> AppResult<Vec<Role>>;

    /// Applies a partial update.
    async fn update(&self, role_id: RoleId, update: &RoleUpdate) -> AppResult<Role>;

    /// Deletes a role and its member links.
    async fn delete(&self, role_id: RoleId) -> AppResult<()>;

    /// Links a role to a member.
    async fn assign(&self, user_id: UserId, role_id: RoleId) -> AppResult<()>;

    /// Unlinks a role from a member.
    async fn unassign(&self, user_id: UserId, role_id: RoleId) -> AppResult<()>;
}

/// Application service for the role hierarchy.
#[derive(Clone)]
pub struct RoleService {
    roles: Arc<dyn RoleRepository>,
    permissions: PermissionService,
    publisher: EventPublisher,
}

impl RoleService {
    /// Creates a new role service.
    #[must_use]
    pub fn new(
        roles: Arc<dyn RoleRepository>,
        permissions: PermissionService,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            roles,
            permissions,
            publisher,
        }
    }

    /// Lists every role.
    pub async fn list(&self) -> AppResult<Vec<Role>> {
        self.roles.list().await
    }

    /// Creates a role.
    pub async fn create(
        &self,
        actor: UserId,
        name: &str,
        permissions: Permissions,
        position: i32,
        color: Option<u32>,
    ) -> AppResult<Role> {
        self.permissions
            .check(actor, None, Permissions::MANAGE_ROLES)
            .await?;
        validate_role_name(name)?;

        let role = self.roles.create(name, permissions, position, color).await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::ROLE_CREATE,
                json!(role),
                RecipientSelector::Server,
            ))
            .await?;
        Ok(role)
    }

    /// Updates a role. Because the role's bits feed every holder's
    /// resolution, the whole cache is invalidated before returning.
    pub async fn update(
        &self,
        actor: UserId,
        role_id: RoleId,
        update: RoleUpdate,
    ) -> AppResult<Role> {
        self.permissions
            .check(actor, None, Permissions::MANAGE_ROLES)
            .await?;
        if let Some(ref name) = update.name {
            validate_role_name(name)?;
        }

        let role = self.roles.update(role_id, &update).await?;
        self.permissions.invalidate_all().await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::ROLE_UPDATE,
                json!(role),
                RecipientSelector::Server,
            ))
            .await?;
        Ok(role)
    }

    /// Deletes a role. The `@everyone` role is refused.
    pub async fn delete(&self, actor: UserId, role_id: RoleId) -> AppResult<()> {
        self.permissions
            .check(actor, None, Permissions::MANAGE_ROLES)
            .await?;
        let role = self
            .roles
            .get(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound("role not found".to_owned()))?;
        if role.is_everyone {
            return Err(AppError::Validation(
                "the @everyone role cannot be deleted".to_owned(),
            ));
        }

        self.roles.delete(role_id).await?;
        self.permissions.invalidate_all().await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::ROLE_DELETE,
                json!({ "id": role_id }),
                RecipientSelector::Server,
            ))
            .await
    }

    /// Assigns a role to a member.
    pub async fn assign(&self, actor: UserId, target: UserId, role_id: RoleId) -> AppResult<()> {
        self.permissions
            .check(actor, None, Permissions::MANAGE_ROLES)
            .await?;
        let role = self
            .roles
            .get(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound("role not found".to_owned()))?;
        if role.is_everyone {
            return Err(AppError::Validation(
                "the @everyone role is held implicitly".to_owned(),
            ));
        }

        self.roles.assign(target, role_id).await?;
        self.permissions.invalidate_user(target).await?;
        self.publish_member_roles_changed(target).await
    }

    /// Removes a role from a member.
    pub async fn unassign(&self, actor: UserId, target: UserId, role_id: RoleId) -> AppResult<()> {
        self.permissions
            .check(actor, None, Permissions::MANAGE_ROLES)
            .await?;

        self.roles.unassign(target, role_id).await?;
        self.permissions.invalidate_user(target).await?;
        self.publish_member_roles_changed(target).await
    }

    async fn publish_member_roles_changed(&self, user_id: UserId) -> AppResult<()> {
        self.publisher
            .publish(OutboundEvent::new(
                event_names::MEMBER_UPDATE,
                json!({ "user_id": user_id }),
                RecipientSelector::Server,
            ))
            .await
    }
}
