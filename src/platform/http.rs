//! REST client for the audit log feed and log channel delivery.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AuditFeed, EntryStream};
use crate::config::PlatformConfig;
use crate::models::audit::{AuditAction, AuditChange, AuditEntry, UserRef};
use crate::models::{GuildId, Snowflake};
use crate::{AppError, Result};

/// Largest page the audit log endpoint returns.
const MAX_PAGE_SIZE: usize = 100;

/// Platform error code for "cannot send an empty message".
const EMPTY_MESSAGE_ERROR: u64 = 50006;

#[derive(Debug, Deserialize)]
struct AuditLogPage {
    #[serde(default)]
    audit_log_entries: Vec<RawAuditEntry>,
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawAuditEntry {
    id: Snowflake,
    action_type: u16,
    #[serde(default)]
    user_id: Option<Snowflake>,
    #[serde(default)]
    target_id: Option<Snowflake>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    changes: Vec<AuditChange>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: Snowflake,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u64,
    #[serde(default)]
    message: String,
}

/// Thin REST client using the bot token.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    api_base: String,
    token: String,
}

impl RestClient {
    /// Build a client from platform settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the token is missing or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(AppError::Config("bot token is not loaded".into()));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(concat!("modwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            token: config.bot_token.clone(),
        })
    }

    /// Fetch one page of audit entries, newest first, older than `before`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::RateLimited`, `AppError::Unauthorized`,
    /// `AppError::NotFound` or `AppError::Platform` depending on the response.
    pub async fn audit_log_page(
        &self,
        guild_id: GuildId,
        before: Option<Snowflake>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        let mut url = format!(
            "{}/guilds/{guild_id}/audit-logs?limit={}",
            self.api_base,
            limit.min(MAX_PAGE_SIZE)
        );
        if let Some(before) = before {
            url.push_str(&format!("&before={before}"));
        }

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await?;
        let response = check_status(response).await?;
        let page: AuditLogPage = response.json().await?;

        debug!(%guild_id, entries = page.audit_log_entries.len(), "fetched audit log page");
        Ok(page.into_entries())
    }

    /// Post a plain message without pinging anyone.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the channel is gone, otherwise the
    /// mapped transport or API error.
    pub async fn create_message(&self, channel_id: Snowflake, content: &str) -> Result<()> {
        let url = format!("{}/channels/{channel_id}/messages", self.api_base);
        let body = json!({
            "content": content,
            "allowed_mentions": { "parse": [] },
            "flags": 1 << 12,
        });

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bot {}", self.token))
            .json(&body)
            .send()
            .await?;

        match check_status(response).await {
            Ok(_) => Ok(()),
            // Occasionally returned despite content being present.
            Err(AppError::Platform(msg)) if msg.starts_with(&EMPTY_MESSAGE_ERROR.to_string()) => {
                debug!(%channel_id, "platform reported an empty message; dropping");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl AuditFeed for RestClient {
    fn fetch_recent_entries(&self, guild_id: GuildId, limit: usize) -> EntryStream<'_> {
        let pager = Pager {
            client: self,
            guild_id,
            before: None,
            remaining: limit,
            buffer: VecDeque::new(),
            exhausted: false,
        };

        stream::try_unfold(pager, next_entry).boxed()
    }
}

async fn next_entry(mut pager: Pager<'_>) -> Result<Option<(AuditEntry, Pager<'_>)>> {
    if pager.remaining == 0 {
        return Ok(None);
    }

    if pager.buffer.is_empty() && !pager.exhausted {
        let page_size = pager.remaining.min(MAX_PAGE_SIZE);
        let page = pager
            .client
            .audit_log_page(pager.guild_id, pager.before, page_size)
            .await?;
        pager.exhausted = page.len() < page_size;
        pager.before = page.last().map(|entry| entry.id);
        pager.buffer.extend(page);
    }

    match pager.buffer.pop_front() {
        Some(entry) => {
            pager.remaining -= 1;
            Ok(Some((entry, pager)))
        }
        None => Ok(None),
    }
}

struct Pager<'a> {
    client: &'a RestClient,
    guild_id: GuildId,
    before: Option<Snowflake>,
    remaining: usize,
    buffer: VecDeque<AuditEntry>,
    exhausted: bool,
}

impl AuditLogPage {
    fn into_entries(self) -> Vec<AuditEntry> {
        let users: HashMap<Snowflake, UserRef> = self
            .users
            .into_iter()
            .map(|user| {
                let name = user.global_name.unwrap_or(user.username);
                (
                    user.id,
                    UserRef {
                        id: user.id,
                        name,
                        bot: user.bot,
                    },
                )
            })
            .collect();

        self.audit_log_entries
            .into_iter()
            .map(|raw| AuditEntry {
                id: raw.id,
                action: AuditAction::from(raw.action_type),
                user: raw.user_id.map(|id| {
                    users
                        .get(&id)
                        .cloned()
                        .unwrap_or_else(|| UserRef::from_id(id))
                }),
                target_id: raw.target_id,
                reason: raw.reason,
                changes: raw.changes,
            })
            .collect()
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ApiError>(&text)
        .map(|err| format!("{} {}", err.code, err.message))
        .unwrap_or(text);

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized(detail),
        StatusCode::NOT_FOUND => AppError::NotFound(detail),
        _ => AppError::Platform(detail),
    })
}
