//! Attributed domain events emitted to listeners.
//!
//! Every event is a closed [`EventPayload`] variant tagged by an
//! [`EventKind`]. The kind together with [`DomainEvent::key`] identifies
//! the event for echo suppression.

use serde::{Deserialize, Serialize};

use super::audit::{AuditEntry, UserRef};
use super::{GuildId, Snowflake};

/// Tag of every domain event the driver can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A member joined the guild.
    MemberJoin,
    /// A member's nickname changed.
    NickChange,
    /// A role was given to a member.
    RoleAdd,
    /// A role was taken from a member.
    RoleRemove,
    /// A member received the mute role.
    MemberMute,
    /// A member lost the mute role.
    MemberUnmute,
    /// A member was kicked.
    MemberKick,
    /// A user was banned.
    MemberBan,
    /// A ban was lifted.
    MemberUnban,
    /// A role was created.
    RoleCreate,
    /// A role was deleted.
    RoleDelete,
    /// A role was renamed.
    RoleNameUpdate,
    /// A role's color changed.
    RoleColorUpdate,
    /// A role's permission bits changed.
    RolePermissionsUpdate,
    /// A role became mentionable or stopped being so.
    RoleMentionableUpdate,
    /// A channel was created.
    ChannelCreate,
    /// A channel was deleted.
    ChannelDelete,
    /// A channel was renamed.
    ChannelNameUpdate,
    /// A channel's slowmode delay changed.
    ChannelSlowmodeDelayUpdate,
}

impl EventKind {
    /// Stable snake-case name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MemberJoin => "member_join",
            Self::NickChange => "nick_change",
            Self::RoleAdd => "role_add",
            Self::RoleRemove => "role_remove",
            Self::MemberMute => "member_mute",
            Self::MemberUnmute => "member_unmute",
            Self::MemberKick => "member_kick",
            Self::MemberBan => "member_ban",
            Self::MemberUnban => "member_unban",
            Self::RoleCreate => "role_create",
            Self::RoleDelete => "role_delete",
            Self::RoleNameUpdate => "role_name_update",
            Self::RoleColorUpdate => "role_color_update",
            Self::RolePermissionsUpdate => "role_permissions_update",
            Self::RoleMentionableUpdate => "role_mentionable_update",
            Self::ChannelCreate => "channel_create",
            Self::ChannelDelete => "channel_delete",
            Self::ChannelNameUpdate => "channel_name_update",
            Self::ChannelSlowmodeDelayUpdate => "channel_slowmode_delay_update",
        }
    }
}

/// Minimal role reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    /// Role ID.
    pub id: Snowflake,
    /// Role name.
    #[serde(default)]
    pub name: String,
}

/// Minimal channel reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    /// Channel ID.
    pub id: Snowflake,
    /// Channel name.
    #[serde(default)]
    pub name: String,
}

/// Infractions a moderator can apply to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Infraction {
    /// Mute role applied.
    Mute,
    /// Mute role removed.
    Unmute,
    /// Removed from the guild.
    Kick,
    /// Removed and barred from rejoining.
    Ban,
    /// Ban lifted.
    Unban,
}

impl Infraction {
    /// Event kind emitted for this infraction.
    #[must_use]
    pub fn kind(self) -> EventKind {
        match self {
            Self::Mute => EventKind::MemberMute,
            Self::Unmute => EventKind::MemberUnmute,
            Self::Kick => EventKind::MemberKick,
            Self::Ban => EventKind::MemberBan,
            Self::Unban => EventKind::MemberUnban,
        }
    }
}

/// A changed role attribute with its old and new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "attribute")]
pub enum RoleChange {
    /// Role renamed.
    Name {
        /// Previous name.
        before: String,
        /// New name.
        after: String,
    },
    /// Display color changed, as `0xRRGGBB`.
    Color {
        /// Previous color.
        before: u32,
        /// New color.
        after: u32,
    },
    /// Permission bitset changed.
    Permissions {
        /// Previous bits.
        before: u64,
        /// New bits.
        after: u64,
    },
    /// Mentionable flag toggled.
    Mentionable {
        /// Previous flag.
        before: bool,
        /// New flag.
        after: bool,
    },
}

/// A changed channel attribute with its old and new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "attribute")]
pub enum ChannelChange {
    /// Channel renamed.
    Name {
        /// Previous name.
        before: String,
        /// New name.
        after: String,
    },
    /// Slowmode delay changed, in seconds.
    SlowmodeDelay {
        /// Previous delay.
        before: u32,
        /// New delay.
        after: u32,
    },
}

/// Event-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EventPayload {
    /// A member joined.
    MemberJoin {
        /// The new member.
        member: UserRef,
    },
    /// A nickname was set, changed or cleared.
    NickChange {
        /// Affected member.
        member: UserRef,
        /// Previous nickname, if any.
        before: Option<String>,
        /// New nickname, if any.
        after: Option<String>,
    },
    /// A role was given to a member.
    RoleAdd {
        /// Affected member.
        member: UserRef,
        /// Role given.
        role: RoleRef,
    },
    /// A role was taken from a member.
    RoleRemove {
        /// Affected member.
        member: UserRef,
        /// Role taken.
        role: RoleRef,
    },
    /// A moderation action against a user.
    Infraction {
        /// Which action.
        infraction: Infraction,
        /// Affected user.
        user: UserRef,
    },
    /// A role was created.
    RoleCreate {
        /// New role.
        role: RoleRef,
    },
    /// A role was deleted.
    RoleDelete {
        /// Deleted role.
        role: RoleRef,
    },
    /// One role attribute changed.
    RoleUpdate {
        /// Affected role, with its current name.
        role: RoleRef,
        /// The changed attribute.
        change: RoleChange,
    },
    /// A channel was created.
    ChannelCreate {
        /// New channel.
        channel: ChannelRef,
    },
    /// A channel was deleted.
    ChannelDelete {
        /// Deleted channel.
        channel: ChannelRef,
    },
    /// One channel attribute changed.
    ChannelUpdate {
        /// Affected channel, with its current name.
        channel: ChannelRef,
        /// The changed attribute.
        change: ChannelChange,
    },
}

/// Who performed an action and why. Both absent means unknown cause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    /// Acting moderator.
    pub moderator: Option<UserRef>,
    /// Reason given by the moderator.
    pub reason: Option<String>,
}

impl Attribution {
    /// Attribution taken from a matched audit entry, if any.
    #[must_use]
    pub fn from_entry(entry: Option<&AuditEntry>) -> Self {
        entry.map_or_else(Self::default, |entry| Self {
            moderator: entry.user.clone(),
            reason: entry.reason.clone(),
        })
    }

    /// Attribution for an actor known without an audit lookup.
    #[must_use]
    pub fn known(moderator: UserRef, reason: Option<String>) -> Self {
        Self {
            moderator: Some(moderator),
            reason,
        }
    }

    /// Whether an actor is attached.
    #[must_use]
    pub fn is_known(&self) -> bool {
        self.moderator.is_some()
    }
}

/// An attributed domain event scoped to one guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Guild the event happened in.
    pub guild_id: GuildId,
    /// What happened.
    pub payload: EventPayload,
    /// Who did it.
    #[serde(default)]
    pub attribution: Attribution,
}

impl DomainEvent {
    /// Unattributed event.
    #[must_use]
    pub fn new(guild_id: GuildId, payload: EventPayload) -> Self {
        Self {
            guild_id,
            payload,
            attribution: Attribution::default(),
        }
    }

    /// Replace the attribution.
    #[must_use]
    pub fn attributed(mut self, attribution: Attribution) -> Self {
        self.attribution = attribution;
        self
    }

    /// Variant tag of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::MemberJoin { .. } => EventKind::MemberJoin,
            EventPayload::NickChange { .. } => EventKind::NickChange,
            EventPayload::RoleAdd { .. } => EventKind::RoleAdd,
            EventPayload::RoleRemove { .. } => EventKind::RoleRemove,
            EventPayload::Infraction { infraction, .. } => infraction.kind(),
            EventPayload::RoleCreate { .. } => EventKind::RoleCreate,
            EventPayload::RoleDelete { .. } => EventKind::RoleDelete,
            EventPayload::RoleUpdate { change, .. } => match change {
                RoleChange::Name { .. } => EventKind::RoleNameUpdate,
                RoleChange::Color { .. } => EventKind::RoleColorUpdate,
                RoleChange::Permissions { .. } => EventKind::RolePermissionsUpdate,
                RoleChange::Mentionable { .. } => EventKind::RoleMentionableUpdate,
            },
            EventPayload::ChannelCreate { .. } => EventKind::ChannelCreate,
            EventPayload::ChannelDelete { .. } => EventKind::ChannelDelete,
            EventPayload::ChannelUpdate { change, .. } => match change {
                ChannelChange::Name { .. } => EventKind::ChannelNameUpdate,
                ChannelChange::SlowmodeDelay { .. } => EventKind::ChannelSlowmodeDelayUpdate,
            },
        }
    }

    /// Identity tuple used for echo suppression.
    #[must_use]
    pub fn key(&self) -> Vec<u64> {
        match &self.payload {
            EventPayload::MemberJoin { member } | EventPayload::NickChange { member, .. } => {
                vec![member.id.0]
            }
            EventPayload::RoleAdd { member, role } | EventPayload::RoleRemove { member, role } => {
                vec![member.id.0, role.id.0]
            }
            EventPayload::Infraction { user, .. } => vec![self.guild_id.0, user.id.0],
            EventPayload::RoleCreate { role }
            | EventPayload::RoleDelete { role }
            | EventPayload::RoleUpdate { role, .. } => vec![role.id.0],
            EventPayload::ChannelCreate { channel }
            | EventPayload::ChannelDelete { channel }
            | EventPayload::ChannelUpdate { channel, .. } => vec![channel.id.0],
        }
    }
}
