//! Audit log entries as consumed by the correlator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Snowflake;

/// Audit log action kinds the attribution engine monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum AuditAction {
    /// A channel was created.
    ChannelCreate,
    /// Channel settings changed.
    ChannelUpdate,
    /// A channel was deleted.
    ChannelDelete,
    /// A member was kicked.
    MemberKick,
    /// Members were pruned for inactivity.
    MemberPrune,
    /// A user was banned.
    MemberBanAdd,
    /// A ban was lifted.
    MemberBanRemove,
    /// Member settings (nickname, timeout) changed.
    MemberUpdate,
    /// Roles were added to or removed from a member.
    MemberRoleUpdate,
    /// A bot joined through an authorization flow.
    BotAdd,
    /// A role was created.
    RoleCreate,
    /// Role settings changed.
    RoleUpdate,
    /// A role was deleted.
    RoleDelete,
    /// Any action kind not monitored here.
    Other(u16),
}

impl From<u16> for AuditAction {
    fn from(code: u16) -> Self {
        match code {
            10 => Self::ChannelCreate,
            11 => Self::ChannelUpdate,
            12 => Self::ChannelDelete,
            20 => Self::MemberKick,
            21 => Self::MemberPrune,
            22 => Self::MemberBanAdd,
            23 => Self::MemberBanRemove,
            24 => Self::MemberUpdate,
            25 => Self::MemberRoleUpdate,
            28 => Self::BotAdd,
            30 => Self::RoleCreate,
            31 => Self::RoleUpdate,
            32 => Self::RoleDelete,
            other => Self::Other(other),
        }
    }
}

impl From<AuditAction> for u16 {
    fn from(action: AuditAction) -> Self {
        match action {
            AuditAction::ChannelCreate => 10,
            AuditAction::ChannelUpdate => 11,
            AuditAction::ChannelDelete => 12,
            AuditAction::MemberKick => 20,
            AuditAction::MemberPrune => 21,
            AuditAction::MemberBanAdd => 22,
            AuditAction::MemberBanRemove => 23,
            AuditAction::MemberUpdate => 24,
            AuditAction::MemberRoleUpdate => 25,
            AuditAction::BotAdd => 28,
            AuditAction::RoleCreate => 30,
            AuditAction::RoleUpdate => 31,
            AuditAction::RoleDelete => 32,
            AuditAction::Other(code) => code,
        }
    }
}

/// Minimal user reference carried by entries and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User ID.
    pub id: Snowflake,
    /// Display name at the time of the event.
    #[serde(default)]
    pub name: String,
    /// Whether the account is a bot.
    #[serde(default)]
    pub bot: bool,
}

impl UserRef {
    /// Reference with only an ID known.
    #[must_use]
    pub fn from_id(id: Snowflake) -> Self {
        Self {
            id,
            name: String::new(),
            bot: false,
        }
    }
}

/// One before/after pair of an audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditChange {
    /// Changed attribute, e.g. `nick`, `name`, `$add`.
    pub key: String,
    /// Value before the action.
    #[serde(default)]
    pub old_value: Option<Value>,
    /// Value after the action.
    #[serde(default)]
    pub new_value: Option<Value>,
}

/// An immutable record of one action taken within a guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry ID; also encodes the creation time.
    pub id: Snowflake,
    /// What happened.
    pub action: AuditAction,
    /// Who did it, if known.
    #[serde(default)]
    pub user: Option<UserRef>,
    /// What it was done to.
    #[serde(default)]
    pub target_id: Option<Snowflake>,
    /// Free-text reason supplied by the actor.
    #[serde(default)]
    pub reason: Option<String>,
    /// Attribute changes recorded with the action.
    #[serde(default)]
    pub changes: Vec<AuditChange>,
}

impl AuditEntry {
    /// Construct an entry without changes.
    #[must_use]
    pub fn new(id: Snowflake, action: AuditAction) -> Self {
        Self {
            id,
            action,
            user: None,
            target_id: None,
            reason: None,
            changes: Vec::new(),
        }
    }

    /// Set the acting user.
    #[must_use]
    pub fn with_user(mut self, user: UserRef) -> Self {
        self.user = Some(user);
        self
    }

    /// Set the target ID.
    #[must_use]
    pub fn with_target(mut self, target_id: Snowflake) -> Self {
        self.target_id = Some(target_id);
        self
    }

    /// Set the reason text.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Append one attribute change.
    #[must_use]
    pub fn with_change(
        mut self,
        key: impl Into<String>,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) -> Self {
        self.changes.push(AuditChange {
            key: key.into(),
            old_value,
            new_value,
        });
        self
    }

    /// Creation time derived from the entry ID.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.id.created_at()
    }

    /// Value of `key` before the action; JSON `null` reads as absent.
    #[must_use]
    pub fn before(&self, key: &str) -> Option<&Value> {
        self.change(key)
            .and_then(|change| change.old_value.as_ref())
            .filter(|value| !value.is_null())
    }

    /// Value of `key` after the action; JSON `null` reads as absent.
    #[must_use]
    pub fn after(&self, key: &str) -> Option<&Value> {
        self.change(key)
            .and_then(|change| change.new_value.as_ref())
            .filter(|value| !value.is_null())
    }

    fn change(&self, key: &str) -> Option<&AuditChange> {
        self.changes.iter().find(|change| change.key == key)
    }
}
