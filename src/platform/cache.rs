//! In-memory guild snapshot maintained from gateway notifications.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use super::GuildDirectory;
use crate::models::event::RoleRef;
use crate::models::{GuildId, Snowflake};

#[derive(Debug, Clone, Default)]
struct GuildState {
    available: bool,
    audit_log_access: bool,
    mute_role: Option<Snowflake>,
    /// Last name seen for the mute role in a gateway snapshot.
    mute_role_name: Option<String>,
}

/// Thread-safe [`GuildDirectory`] backed by a hash map.
#[derive(Debug, Default)]
pub struct GuildCache {
    guilds: RwLock<HashMap<GuildId, GuildState>>,
}

impl GuildCache {
    /// Empty cache; every guild reads as unavailable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a guild is available with the given audit log permission.
    pub fn set_available(&self, guild_id: GuildId, audit_log_access: bool) {
        let mut guilds = self.guilds.write().unwrap_or_else(PoisonError::into_inner);
        let state = guilds.entry(guild_id).or_default();
        state.available = true;
        state.audit_log_access = audit_log_access;
        debug!(%guild_id, audit_log_access, "guild available");
    }

    /// Record that the bot left or lost the guild.
    ///
    /// The configured mute role is kept so a rejoin does not lose it.
    pub fn set_unavailable(&self, guild_id: GuildId) {
        let mut guilds = self.guilds.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = guilds.get_mut(&guild_id) {
            state.available = false;
            state.audit_log_access = false;
        }
        debug!(%guild_id, "guild unavailable");
    }

    /// Configure the mute role for a guild.
    pub fn set_mute_role(&self, guild_id: GuildId, role_id: Option<Snowflake>) {
        let mut guilds = self.guilds.write().unwrap_or_else(PoisonError::into_inner);
        let state = guilds.entry(guild_id).or_default();
        if state.mute_role != role_id {
            state.mute_role_name = None;
        }
        state.mute_role = role_id;
    }

    /// Remember `name` if `role_id` is the guild's mute role.
    pub fn note_role_name(&self, guild_id: GuildId, role_id: Snowflake, name: &str) {
        let mut guilds = self.guilds.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = guilds.get_mut(&guild_id) {
            if state.mute_role == Some(role_id) && !name.is_empty() {
                state.mute_role_name = Some(name.to_owned());
            }
        }
    }

    /// The mute role with its last known name; the name is empty until a
    /// snapshot containing the role has been seen.
    #[must_use]
    pub fn mute_role_ref(&self, guild_id: GuildId) -> Option<RoleRef> {
        let state = self.get(guild_id)?;
        state.mute_role.map(|id| RoleRef {
            id,
            name: state.mute_role_name.unwrap_or_default(),
        })
    }

    fn get(&self, guild_id: GuildId) -> Option<GuildState> {
        let guilds = self.guilds.read().unwrap_or_else(PoisonError::into_inner);
        guilds.get(&guild_id).cloned()
    }
}

impl GuildDirectory for GuildCache {
    fn has_audit_log_access(&self, guild_id: GuildId) -> bool {
        self.get(guild_id)
            .is_some_and(|state| state.available && state.audit_log_access)
    }

    fn is_available(&self, guild_id: GuildId) -> bool {
        self.get(guild_id).is_some_and(|state| state.available)
    }

    fn mute_role(&self, guild_id: GuildId) -> Option<Snowflake> {
        self.get(guild_id).and_then(|state| state.mute_role)
    }
}
