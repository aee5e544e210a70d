//! Raw gateway notifications, before attribution.

use serde::{Deserialize, Serialize};

use super::audit::UserRef;
use super::event::{ChannelRef, RoleRef};
use super::{GuildId, Snowflake};

/// Role state as delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSnapshot {
    /// Role ID.
    pub id: Snowflake,
    /// Role name.
    pub name: String,
    /// RGB color value.
    #[serde(default)]
    pub color: u32,
    /// Permission bit set.
    #[serde(default)]
    pub permissions: u64,
    /// Whether anyone may mention the role.
    #[serde(default)]
    pub mentionable: bool,
    /// Managed by an integration; such changes never show up in the audit log.
    #[serde(default)]
    pub managed: bool,
}

impl RoleSnapshot {
    /// Reference form of this role.
    #[must_use]
    pub fn to_ref(&self) -> RoleRef {
        RoleRef {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// The implicit everyone role shares its ID with the guild.
    #[must_use]
    pub fn is_default(&self, guild_id: GuildId) -> bool {
        self.id == guild_id
    }
}

/// Channel state as delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    /// Channel ID.
    pub id: Snowflake,
    /// Channel name.
    pub name: String,
    /// Per-user message rate limit in seconds.
    #[serde(default)]
    pub slowmode_delay: u32,
}

impl ChannelSnapshot {
    /// Reference form of this channel.
    #[must_use]
    pub fn to_ref(&self) -> ChannelRef {
        ChannelRef {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Member state as delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    /// The member's user.
    pub user: UserRef,
    /// Guild nickname.
    #[serde(default)]
    pub nick: Option<String>,
    /// Roles held, including the default role when present.
    #[serde(default)]
    pub roles: Vec<RoleSnapshot>,
}

/// A change notification from the gateway. Carries no actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RawEvent {
    /// The guild became available, or its permissions changed.
    GuildAvailable {
        /// Affected guild.
        guild_id: GuildId,
        /// Whether the bot may read the audit log.
        audit_log_access: bool,
    },
    /// The bot was removed from the guild or the guild went away.
    GuildRemove {
        /// Affected guild.
        guild_id: GuildId,
    },
    /// A member joined.
    MemberJoin {
        /// Affected guild.
        guild_id: GuildId,
        /// The new member with any roles granted on join.
        member: MemberSnapshot,
    },
    /// A member's nickname or roles changed.
    MemberUpdate {
        /// Affected guild.
        guild_id: GuildId,
        /// Member state before the change.
        before: MemberSnapshot,
        /// Member state after the change.
        after: MemberSnapshot,
    },
    /// A member left, was kicked, or was banned.
    MemberRemove {
        /// Affected guild.
        guild_id: GuildId,
        /// The departed user.
        user: UserRef,
    },
    /// A user was banned.
    MemberBan {
        /// Affected guild.
        guild_id: GuildId,
        /// The banned user.
        user: UserRef,
    },
    /// A ban was lifted.
    MemberUnban {
        /// Affected guild.
        guild_id: GuildId,
        /// The unbanned user.
        user: UserRef,
    },
    /// A role was created.
    RoleCreate {
        /// Affected guild.
        guild_id: GuildId,
        /// The new role.
        role: RoleSnapshot,
    },
    /// Role settings changed.
    RoleUpdate {
        /// Affected guild.
        guild_id: GuildId,
        /// Role state before the change.
        before: RoleSnapshot,
        /// Role state after the change.
        after: RoleSnapshot,
    },
    /// A role was deleted.
    RoleDelete {
        /// Affected guild.
        guild_id: GuildId,
        /// The deleted role.
        role: RoleSnapshot,
    },
    /// A channel was created.
    ChannelCreate {
        /// Affected guild.
        guild_id: GuildId,
        /// The new channel.
        channel: ChannelSnapshot,
    },
    /// Channel settings changed.
    ChannelUpdate {
        /// Affected guild.
        guild_id: GuildId,
        /// Channel state before the change.
        before: ChannelSnapshot,
        /// Channel state after the change.
        after: ChannelSnapshot,
    },
    /// A channel was deleted.
    ChannelDelete {
        /// Affected guild.
        guild_id: GuildId,
        /// The deleted channel.
        channel: ChannelSnapshot,
    },
}

impl RawEvent {
    /// Guild the notification belongs to.
    #[must_use]
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::GuildAvailable { guild_id, .. }
            | Self::GuildRemove { guild_id }
            | Self::MemberJoin { guild_id, .. }
            | Self::MemberUpdate { guild_id, .. }
            | Self::MemberRemove { guild_id, .. }
            | Self::MemberBan { guild_id, .. }
            | Self::MemberUnban { guild_id, .. }
            | Self::RoleCreate { guild_id, .. }
            | Self::RoleUpdate { guild_id, .. }
            | Self::RoleDelete { guild_id, .. }
            | Self::ChannelCreate { guild_id, .. }
            | Self::ChannelUpdate { guild_id, .. }
            | Self::ChannelDelete { guild_id, .. } => *guild_id,
        }
    }
}
