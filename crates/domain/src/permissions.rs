//! The 64-bit permission bitfield.

use serde::{Deserialize, Serialize};

/// A set of permissions encoded as a 64-bit bitfield.
///
/// Serialises as the raw `u64` so clients and the cache share one encoding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Permissions(u64);

impl Permissions {
    /// The empty permission set.
    pub const NONE: Self = Self(0);

    /// Grants every permission and short-circuits all channel checks.
    pub const ADMINISTRATOR: Self = Self(1 << 0);
    /// See a channel and read its history.
    pub const VIEW_CHANNELS: Self = Self(1 << 1);
    /// Create, edit, and delete channels and categories.
    pub const MANAGE_CHANNELS: Self = Self(1 << 2);
    /// Create, edit, delete, and assign roles below one's own.
    pub const MANAGE_ROLES: Self = Self(1 << 3);
    /// Edit server-level settings.
    pub const MANAGE_SERVER: Self = Self(1 << 4);
    /// Create invite links.
    pub const CREATE_INVITES: Self = Self(1 << 5);
    /// Remove members from the server.
    pub const KICK_MEMBERS: Self = Self(1 << 6);
    /// Ban members from the server.
    pub const BAN_MEMBERS: Self = Self(1 << 7);
    /// Place members in timeout.
    pub const TIMEOUT_MEMBERS: Self = Self(1 << 8);
    /// Send messages in text channels.
    pub const SEND_MESSAGES: Self = Self(1 << 9);
    /// Render link embeds on own messages.
    pub const EMBED_LINKS: Self = Self(1 << 10);
    /// Upload attachments.
    pub const ATTACH_FILES: Self = Self(1 << 11);
    /// Add reactions to messages.
    pub const ADD_REACTIONS: Self = Self(1 << 12);
    /// Mention the whole server.
    pub const MENTION_EVERYONE: Self = Self(1 << 13);
    /// Delete or edit other members' messages.
    pub const MANAGE_MESSAGES: Self = Self(1 << 14);
    /// Pin and unpin messages.
    pub const PIN_MESSAGES: Self = Self(1 << 15);
    /// Join voice channels.
    pub const CONNECT: Self = Self(1 << 16);
    /// Transmit audio in voice channels.
    pub const SPEAK: Self = Self(1 << 17);
    /// Transmit video in voice channels.
    pub const VIDEO: Self = Self(1 << 18);
    /// Server-mute members in voice channels.
    pub const MUTE_MEMBERS: Self = Self(1 << 19);
    /// Server-deafen members in voice channels.
    pub const DEAFEN_MEMBERS: Self = Self(1 << 20);
    /// Move members between voice channels.
    pub const MOVE_MEMBERS: Self = Self(1 << 21);

    /// Bits force-cleared while a member is timed out.
    pub const TIMEOUT_CLEARED: Self = Self(
        Self::SEND_MESSAGES.0 | Self::ADD_REACTIONS.0 | Self::SPEAK.0 | Self::CONNECT.0,
    );

    /// Creates a permission set from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// True when every bit of `other` is present in `self`.
    #[must_use]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when no bits are set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Union of two sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set difference.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Intersection of two sets.
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Applies a deny-then-allow override pass: `(self & !deny) | allow`.
    #[must_use]
    pub const fn apply_override(self, allow: Self, deny: Self) -> Self {
        Self((self.0 & !deny.0) | allow.0)
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Display for Permissions {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Permissions;

    #[test]
    fn contains_requires_all_bits() {
        let set = Permissions::SEND_MESSAGES | Permissions::VIEW_CHANNELS;
        assert!(set.contains(Permissions::SEND_MESSAGES));
        assert!(set.contains(Permissions::SEND_MESSAGES | Permissions::VIEW_CHANNELS));
        assert!(!set.contains(Permissions::SEND_MESSAGES | Permissions::MANAGE_ROLES));
    }

    #[test]
    fn override_pass_denies_then_allows() {
        let base = Permissions::SEND_MESSAGES | Permissions::VIEW_CHANNELS;
        let result = base.apply_override(Permissions::ADD_REACTIONS, Permissions::SEND_MESSAGES);
        assert!(!result.contains(Permissions::SEND_MESSAGES));
        assert!(result.contains(Permissions::ADD_REACTIONS));
        assert!(result.contains(Permissions::VIEW_CHANNELS));
    }

    #[test]
    fn allow_wins_over_deny_within_one_pass() {
        let base = Permissions::NONE;
        let both = Permissions::SEND_MESSAGES;
        let result = base.apply_override(both, both);
        assert!(result.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn timeout_mask_covers_expected_bits() {
        assert!(Permissions::TIMEOUT_CLEARED.contains(Permissions::SEND_MESSAGES));
        assert!(Permissions::TIMEOUT_CLEARED.contains(Permissions::ADD_REACTIONS));
        assert!(Permissions::TIMEOUT_CLEARED.contains(Permissions::SPEAK));
        assert!(Permissions::TIMEOUT_CLEARED.contains(Permissions::CONNECT));
        assert!(!Permissions::TIMEOUT_CLEARED.contains(Permissions::VIEW_CHANNELS));
    }

    #[test]
    fn serde_is_transparent_u64() {
        let set = Permissions::SEND_MESSAGES | Permissions::CONNECT;
        let json = serde_json::to_string(&set).unwrap_or_default();
        assert_eq!(json, set.bits().to_string());
    }
}
