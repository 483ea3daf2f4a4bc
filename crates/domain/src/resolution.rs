//! Pure permission resolution over roles and channel overrides.

use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, RoleId, UserId};
use crate::member::MemberStatus;
use crate::permissions::Permissions;

/// Target of a channel-scoped permission override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OverrideTarget {
    /// Applies to every member holding the role.
    Role(RoleId),
    /// Applies to one specific member.
    User(UserId),
}

/// A channel-scoped adjustment to resolved permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverride {
    /// Channel the override is scoped to.
    pub channel_id: ChannelId,
    /// Role or user the override applies to.
    pub target: OverrideTarget,
    /// Bits granted by this override.
    pub allow: Permissions,
    /// Bits removed by this override.
    pub deny: Permissions,
}

/// A role as seen by the resolver: just the fields the algorithm reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    /// Role identifier, matched against role-targeted overrides.
    pub id: RoleId,
    /// Position in the role hierarchy; higher beats lower.
    pub position: i32,
    /// The role's permission bits.
    pub permissions: Permissions,
    /// Whether this is the implicit `@everyone` role.
    pub is_everyone: bool,
}

/// Everything the resolver needs to compute one user's permissions.
#[derive(Debug, Clone)]
pub struct ResolutionInput {
    /// Whether the user is the designated server owner.
    pub is_owner: bool,
    /// The user's membership state.
    pub member_status: MemberStatus,
    /// The `@everyone` role plus every role assigned to the user.
    pub roles: Vec<ResolvedRole>,
    /// All overrides of the channel in question; empty for global checks.
    pub overrides: Vec<PermissionOverride>,
    /// The user the check is for, matched against user-targeted overrides.
    pub user_id: UserId,
}

/// Computes the effective permission set for one user in one channel (or
/// globally when the input carries no overrides).
///
/// Order of application:
/// 1. owner or any role holding `ADMINISTRATOR` grants everything;
/// 2. base = union of `@everyone` and assigned role permissions;
/// 3. `@everyone` override pass, then role override passes in ascending
///    position (same-position denies and allows each combine by union),
///    then the user-specific pass, each as `(value & !deny) | allow`;
/// 4. a timed-out member loses `TIMEOUT_CLEARED` bits unconditionally.
#[must_use]
pub fn resolve_permissions(input: &ResolutionInput) -> Permissions {
    if input.is_owner {
        return Permissions::from_bits(u64::MAX);
    }

    let mut resolved = Permissions::NONE;
    for role in &input.roles {
        resolved |= role.permissions;
    }

    if resolved.contains(Permissions::ADMINISTRATOR) {
        return Permissions::from_bits(u64::MAX);
    }

    resolved = apply_channel_overrides(resolved, input);

    if input.member_status == MemberStatus::TimedOut {
        resolved = resolved.difference(Permissions::TIMEOUT_CLEARED);
    }

    resolved
}

fn apply_channel_overrides(base: Permissions, input: &ResolutionInput) -> Permissions {
    if input.overrides.is_empty() {
        return base;
    }

    let mut resolved = base;

    // Pass 1: the @everyone role's override.
    let everyone_role = input.roles.iter().find(|role| role.is_everyone);
    if let Some(everyone) = everyone_role {
        for entry in &input.overrides {
            if entry.target == OverrideTarget::Role(everyone.id) {
                resolved = resolved.apply_override(entry.allow, entry.deny);
            }
        }
    }

    // Pass 2: assigned role overrides in ascending position order, with
    // same-position overrides contributing by union.
    let mut assigned: Vec<&ResolvedRole> = input
        .roles
        .iter()
        .filter(|role| !role.is_everyone)
        .collect();
    assigned.sort_by_key(|role| role.position);

    let mut index = 0;
    while index < assigned.len() {
        let position = assigned[index].position;
        let mut allow = Permissions::NONE;
        let mut deny = Permissions::NONE;
        let mut found = false;

        while index < assigned.len() && assigned[index].position == position {
            let role_id = assigned[index].id;
            for entry in &input.overrides {
                if entry.target == OverrideTarget::Role(role_id) {
                    allow = allow.union(entry.allow);
                    deny = deny.union(entry.deny);
                    found = true;
                }
            }
            index += 1;
        }

        if found {
            resolved = resolved.apply_override(allow, deny);
        }
    }

    // Pass 3: the user-specific override.
    for entry in &input.overrides {
        if entry.target == OverrideTarget::User(input.user_id) {
            resolved = resolved.apply_override(entry.allow, entry.deny);
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn everyone(permissions: Permissions) -> ResolvedRole {
        ResolvedRole {
            id: RoleId::new(),
            position: 0,
            permissions,
            is_everyone: true,
        }
    }

    fn role(position: i32, permissions: Permissions) -> ResolvedRole {
        ResolvedRole {
            id: RoleId::new(),
            position,
            permissions,
            is_everyone: false,
        }
    }

    fn input(roles: Vec<ResolvedRole>, overrides: Vec<PermissionOverride>) -> ResolutionInput {
        ResolutionInput {
            is_owner: false,
            member_status: MemberStatus::Active,
            roles,
            overrides,
            user_id: UserId::new(),
        }
    }

    fn override_for(channel: ChannelId, target: OverrideTarget, allow: Permissions, deny: Permissions) -> PermissionOverride {
        PermissionOverride {
            channel_id: channel,
            target,
            allow,
            deny,
        }
    }

    #[test]
    fn owner_gets_everything() {
        let mut subject = input(vec![], vec![]);
        subject.is_owner = true;
        let resolved = resolve_permissions(&subject);
        assert!(resolved.contains(Permissions::MANAGE_SERVER));
        assert!(resolved.contains(Permissions::ADMINISTRATOR));
    }

    #[test]
    fn administrator_role_short_circuits_overrides() {
        let channel = ChannelId::new();
        let admin = role(5, Permissions::ADMINISTRATOR);
        let deny_everything = override_for(
            channel,
            OverrideTarget::Role(admin.id),
            Permissions::NONE,
            Permissions::from_bits(u64::MAX),
        );
        let subject = input(
            vec![everyone(Permissions::VIEW_CHANNELS), admin],
            vec![deny_everything],
        );
        assert!(resolve_permissions(&subject).contains(Permissions::MANAGE_SERVER));
    }

    #[test]
    fn base_is_union_of_roles() {
        let subject = input(
            vec![
                everyone(Permissions::VIEW_CHANNELS),
                role(1, Permissions::SEND_MESSAGES),
                role(2, Permissions::ATTACH_FILES),
            ],
            vec![],
        );
        let resolved = resolve_permissions(&subject);
        assert!(resolved.contains(
            Permissions::VIEW_CHANNELS | Permissions::SEND_MESSAGES | Permissions::ATTACH_FILES
        ));
    }

    #[test]
    fn role_override_denies_base_grant() {
        let channel = ChannelId::new();
        let sender = role(1, Permissions::SEND_MESSAGES);
        let deny = override_for(
            channel,
            OverrideTarget::Role(sender.id),
            Permissions::NONE,
            Permissions::SEND_MESSAGES,
        );
        let subject = input(vec![everyone(Permissions::VIEW_CHANNELS), sender], vec![deny]);
        let resolved = resolve_permissions(&subject);
        assert!(!resolved.contains(Permissions::SEND_MESSAGES));
        assert!(resolved.contains(Permissions::VIEW_CHANNELS));
    }

    #[test]
    fn higher_position_allow_beats_lower_position_deny() {
        let channel = ChannelId::new();
        let low = role(1, Permissions::NONE);
        let high = role(2, Permissions::NONE);
        let deny_low = override_for(
            channel,
            OverrideTarget::Role(low.id),
            Permissions::NONE,
            Permissions::SEND_MESSAGES,
        );
        let allow_high = override_for(
            channel,
            OverrideTarget::Role(high.id),
            Permissions::SEND_MESSAGES,
            Permissions::NONE,
        );
        let subject = input(
            vec![everyone(Permissions::VIEW_CHANNELS), low, high],
            vec![deny_low, allow_high],
        );
        assert!(resolve_permissions(&subject).contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn same_position_overrides_union_with_allow_winning() {
        let channel = ChannelId::new();
        let first = role(3, Permissions::NONE);
        let second = role(3, Permissions::NONE);
        let deny_first = override_for(
            channel,
            OverrideTarget::Role(first.id),
            Permissions::NONE,
            Permissions::SEND_MESSAGES,
        );
        let allow_second = override_for(
            channel,
            OverrideTarget::Role(second.id),
            Permissions::SEND_MESSAGES,
            Permissions::NONE,
        );
        let subject = input(
            vec![everyone(Permissions::NONE), first, second],
            vec![deny_first, allow_second],
        );
        // Union of denies and allows within one pass; allow is applied last.
        assert!(resolve_permissions(&subject).contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn user_override_beats_role_overrides() {
        let channel = ChannelId::new();
        let sender = role(1, Permissions::SEND_MESSAGES);
        let allow_role = override_for(
            channel,
            OverrideTarget::Role(sender.id),
            Permissions::SEND_MESSAGES,
            Permissions::NONE,
        );
        let mut subject = input(vec![everyone(Permissions::NONE), sender], vec![allow_role]);
        subject.overrides.push(override_for(
            channel,
            OverrideTarget::User(subject.user_id),
            Permissions::NONE,
            Permissions::SEND_MESSAGES,
        ));
        assert!(!resolve_permissions(&subject).contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn everyone_override_applies_first() {
        let channel = ChannelId::new();
        let base = everyone(Permissions::SEND_MESSAGES | Permissions::VIEW_CHANNELS);
        let deny_everyone = override_for(
            channel,
            OverrideTarget::Role(base.id),
            Permissions::NONE,
            Permissions::SEND_MESSAGES,
        );
        let booster = role(1, Permissions::NONE);
        let allow_booster = override_for(
            channel,
            OverrideTarget::Role(booster.id),
            Permissions::SEND_MESSAGES,
            Permissions::NONE,
        );
        let subject = input(vec![base, booster], vec![deny_everyone, allow_booster]);
        // Role pass runs after the @everyone pass, so the grant survives.
        assert!(resolve_permissions(&subject).contains(Permissions::SEND_MESSAGES));
    }

    mod laws {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn override_pass_always_contains_its_allow_bits(
                base in any::<u64>(),
                allow in any::<u64>(),
                deny in any::<u64>(),
            ) {
                let result = Permissions::from_bits(base)
                    .apply_override(Permissions::from_bits(allow), Permissions::from_bits(deny));
                prop_assert!(result.contains(Permissions::from_bits(allow)));
            }

            #[test]
            fn resolution_without_overrides_is_role_union(
                everyone_bits in any::<u64>(),
                role_bits in any::<u64>(),
            ) {
                // Administrator would short-circuit; mask it out of the raw input.
                let admin = Permissions::ADMINISTRATOR.bits();
                let everyone_bits = everyone_bits & !admin;
                let role_bits = role_bits & !admin;
                let subject = input(
                    vec![
                        everyone(Permissions::from_bits(everyone_bits)),
                        role(1, Permissions::from_bits(role_bits)),
                    ],
                    vec![],
                );
                prop_assert_eq!(
                    resolve_permissions(&subject).bits(),
                    everyone_bits | role_bits
                );
            }
        }
    }

    #[test]
    fn timed_out_member_loses_send_even_with_allow_override() {
        let channel = ChannelId::new();
        let mut subject = input(
            vec![everyone(Permissions::SEND_MESSAGES | Permissions::VIEW_CHANNELS)],
            vec![],
        );
        subject.overrides.push(override_for(
            channel,
            OverrideTarget::User(subject.user_id),
            Permissions::SEND_MESSAGES | Permissions::CONNECT,
            Permissions::NONE,
        ));
        subject.member_status = MemberStatus::TimedOut;
        let resolved = resolve_permissions(&subject);
        assert!(!resolved.contains(Permissions::SEND_MESSAGES));
        assert!(!resolved.contains(Permissions::CONNECT));
        assert!(resolved.contains(Permissions::VIEW_CHANNELS));
    }
}
