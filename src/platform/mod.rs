//! Platform collaborators consumed by the attribution engine.
//!
//! The gateway connection is external; what the engine needs from the
//! platform is an [`AuditFeed`] to read recent audit entries and a
//! [`GuildDirectory`] holding a cached permission and availability
//! snapshot per guild.

pub mod cache;
pub mod http;

use futures_util::stream::BoxStream;

use crate::models::audit::AuditEntry;
use crate::models::{GuildId, Snowflake};
use crate::Result;

/// Lazily fetched audit entries, newest first.
pub type EntryStream<'a> = BoxStream<'a, Result<AuditEntry>>;

/// Source of a guild's audit log.
///
/// Implementations must be [`Send`] and [`Sync`] so one feed can serve
/// every per-guild poll task.
pub trait AuditFeed: Send + Sync {
    /// Stream up to `limit` of the most recent entries, newest first.
    ///
    /// Items are fetched on demand; dropping the stream stops paging.
    /// Transport and rate-limit failures surface as `Err` items.
    fn fetch_recent_entries(&self, guild_id: GuildId, limit: usize) -> EntryStream<'_>;
}

/// Cached guild state used to gate audit log access.
pub trait GuildDirectory: Send + Sync {
    /// Whether the bot may currently read the guild's audit log.
    fn has_audit_log_access(&self, guild_id: GuildId) -> bool;

    /// Whether the guild is still reachable (the bot has not been removed).
    fn is_available(&self, guild_id: GuildId) -> bool;

    /// Role applied to muted members, if the guild configured one.
    fn mute_role(&self, guild_id: GuildId) -> Option<Snowflake>;
}

pub use cache::GuildCache;
pub use http::RestClient;
