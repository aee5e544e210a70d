//! Global configuration parsing, validation, and credential loading.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::models::Snowflake;
use crate::{AppError, Result};

const KEYRING_SERVICE: &str = "modwatch";

/// Upper bound for every configured duration: one day.
const MAX_DURATION_SECONDS: u64 = 86_400;

/// Platform REST API connectivity.
///
/// The bot token is loaded at runtime via OS keychain or environment
/// variable, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PlatformConfig {
    /// Base URL of the REST API, without trailing slash.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Bot token (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_seconds: default_request_timeout(),
            bot_token: String::new(),
        }
    }
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".into()
}

fn default_request_timeout() -> u64 {
    10
}

/// Audit log polling and attribution tuning.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AttributionConfig {
    /// Delay between audit log fetches for one guild.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Entries older than this are not considered during a fetch pass.
    #[serde(default = "default_lookback_seconds")]
    pub lookback_seconds: u64,
    /// Upper bound on entries read per fetch pass.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    /// Lookup timeout for most actions.
    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u64,
    /// Lookup timeout for kicks, which race with bans.
    #[serde(default = "default_kick_timeout_seconds")]
    pub kick_timeout_seconds: u64,
    /// How long self-caused markers stay active.
    #[serde(default = "default_suppression_window_seconds")]
    pub suppression_window_seconds: u64,
    /// Re-attribute entries made by other bots using their reason text.
    #[serde(default)]
    pub reason_attribution: bool,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            lookback_seconds: default_lookback_seconds(),
            fetch_limit: default_fetch_limit(),
            default_timeout_seconds: default_timeout_seconds(),
            kick_timeout_seconds: default_kick_timeout_seconds(),
            suppression_window_seconds: default_suppression_window_seconds(),
            reason_attribution: false,
        }
    }
}

impl AttributionConfig {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Lookback window as a [`Duration`].
    #[must_use]
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_seconds)
    }

    /// Default lookup timeout.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds)
    }

    /// Kick lookup timeout.
    #[must_use]
    pub fn kick_timeout(&self) -> Duration {
        Duration::from_secs(self.kick_timeout_seconds)
    }

    /// Suppression marker lifetime.
    #[must_use]
    pub fn suppression_window(&self) -> Duration {
        Duration::from_secs(self.suppression_window_seconds)
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_lookback_seconds() -> u64 {
    16
}

fn default_fetch_limit() -> usize {
    100
}

fn default_timeout_seconds() -> u64 {
    8
}

fn default_kick_timeout_seconds() -> u64 {
    4
}

fn default_suppression_window_seconds() -> u64 {
    5
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// User ID of the bot account; its own removals are never reported.
    pub bot_user_id: Snowflake,
    /// Channel receiving formatted log lines. Stdout is used when absent.
    #[serde(default)]
    pub log_channel_id: Option<Snowflake>,
    /// REST API settings.
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Attribution engine tuning.
    #[serde(default)]
    pub attribution: AttributionConfig,
    /// Mute role per guild, keyed by guild ID.
    #[serde(default)]
    pub mute_roles: HashMap<String, Snowflake>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the bot token from OS keychain with env-var fallback.
    ///
    /// Tries the `modwatch` keyring service first, then falls back to the
    /// `MODWATCH_BOT_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither source provides a token.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.platform.bot_token = load_credential("bot_token", "MODWATCH_BOT_TOKEN").await?;
        Ok(())
    }

    /// Parsed mute role map, skipping keys that are not valid guild IDs.
    #[must_use]
    pub fn mute_roles(&self) -> Vec<(Snowflake, Snowflake)> {
        self.mute_roles
            .iter()
            .filter_map(|(guild, role)| guild.parse::<Snowflake>().ok().map(|g| (g, *role)))
            .collect()
    }

    fn validate(&self) -> Result<()> {
        let attribution = &self.attribution;

        if attribution.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "attribution.poll_interval_ms must be greater than zero".into(),
            ));
        }

        if attribution.fetch_limit == 0 {
            return Err(AppError::Config(
                "attribution.fetch_limit must be greater than zero".into(),
            ));
        }

        if attribution.default_timeout_seconds == 0 || attribution.kick_timeout_seconds == 0 {
            return Err(AppError::Config(
                "attribution timeouts must be greater than zero".into(),
            ));
        }

        let durations = [
            ("platform.request_timeout_seconds", self.platform.request_timeout_seconds),
            ("attribution.poll_interval_ms", attribution.poll_interval_ms / 1_000),
            ("attribution.lookback_seconds", attribution.lookback_seconds),
            ("attribution.default_timeout_seconds", attribution.default_timeout_seconds),
            ("attribution.kick_timeout_seconds", attribution.kick_timeout_seconds),
            ("attribution.suppression_window_seconds", attribution.suppression_window_seconds),
        ];
        if let Some((name, _)) = durations
            .iter()
            .find(|(_, seconds)| *seconds > MAX_DURATION_SECONDS)
        {
            return Err(AppError::Config(format!(
                "{name} must not exceed one day"
            )));
        }

        if self.platform.api_base.ends_with('/') {
            return Err(AppError::Config(
                "platform.api_base must not end with a slash".into(),
            ));
        }

        if let Some(guild) = self.mute_roles.keys().find(|key| key.parse::<Snowflake>().is_err()) {
            return Err(AppError::Config(format!(
                "mute_roles key {guild} is not a guild id"
            )));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            AppError::Config(format!(
                "credential {keyring_key} not found in keychain service {KEYRING_SERVICE} or {env_key} env var"
            ))
        })
}
