//! Re-attribution of entries created by other moderation bots.
//!
//! Many bots execute actions on behalf of a human and record who in the
//! reason text. When enabled, an entry made by a bot whose reason matches
//! one of the known formats is rewritten to name that human instead.

use regex::Regex;

use crate::models::audit::{AuditEntry, UserRef};
use crate::models::Snowflake;
use crate::{AppError, Result};

const PATTERNS: [&str; 3] = [
    r"(?s)^Action by (?P<name>.+?#\d{4}) \((?P<id>\d{15,20})\)(?::\s*(?P<reason>.*))?$",
    r"(?s)^\[\s*Moderator:\s*(?P<name>.+?)\s*\((?P<id>\d{15,20})\)\s*\]\s*(?P<reason>.*)$",
    r"(?s)^(?P<name>[^()\n]+?) \((?P<id>\d{15,20})\)(?::\s*(?P<reason>.*))?$",
];

/// Parses moderator identity out of bot-formatted reasons.
#[derive(Debug, Clone)]
pub struct ReasonParser {
    patterns: Vec<Regex>,
}

impl ReasonParser {
    /// Compile the known reason formats.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a pattern fails to compile.
    pub fn new() -> Result<Self> {
        let patterns = PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| AppError::Config(format!("invalid reason pattern: {err}")))?;
        Ok(Self { patterns })
    }

    /// Rewrite actor and reason if the entry was made by a bot on
    /// someone's behalf; otherwise return it unchanged.
    #[must_use]
    pub fn reattribute(&self, mut entry: AuditEntry) -> AuditEntry {
        if !entry.user.as_ref().is_some_and(|user| user.bot) {
            return entry;
        }

        let Some(text) = entry.reason.as_deref() else {
            return entry;
        };

        let Some((moderator, reason)) = self.parse(text) else {
            return entry;
        };

        entry.user = Some(moderator);
        entry.reason = reason;
        entry
    }

    fn parse(&self, text: &str) -> Option<(UserRef, Option<String>)> {
        let captures = self
            .patterns
            .iter()
            .find_map(|pattern| pattern.captures(text.trim()))?;

        let id: Snowflake = captures.name("id")?.as_str().parse().ok()?;
        let name = captures
            .name("name")
            .map(|m| m.as_str().trim().to_owned())
            .unwrap_or_default();
        let reason = captures
            .name("reason")
            .map(|m| m.as_str().trim())
            .filter(|reason| !reason.is_empty())
            .map(str::to_owned);

        Some((
            UserRef {
                id,
                name,
                bot: false,
            },
            reason,
        ))
    }
}
