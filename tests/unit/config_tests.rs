use std::time::Duration;

use modwatch::config::GlobalConfig;
use modwatch::models::Snowflake;
use modwatch::AppError;

fn sample_toml() -> &'static str {
    r#"
bot_user_id = "900000000000000001"
log_channel_id = "900000000000000002"

[platform]
api_base = "http://127.0.0.1:8080/api"
request_timeout_seconds = 3

[attribution]
poll_interval_ms = 1500
lookback_seconds = 20
fetch_limit = 50
default_timeout_seconds = 6
kick_timeout_seconds = 3
suppression_window_seconds = 4
reason_attribution = true

[mute_roles]
"1000" = "2000"
"1001" = 2001
"#
}

#[test]
fn parses_valid_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("config parses");

    assert_eq!(config.bot_user_id, Snowflake(900_000_000_000_000_001));
    assert_eq!(config.log_channel_id, Some(Snowflake(900_000_000_000_000_002)));
    assert_eq!(config.platform.api_base, "http://127.0.0.1:8080/api");
    assert_eq!(config.platform.request_timeout_seconds, 3);
    assert!(config.platform.bot_token.is_empty(), "token never comes from TOML");

    let attribution = &config.attribution;
    assert_eq!(attribution.poll_interval(), Duration::from_millis(1_500));
    assert_eq!(attribution.lookback(), Duration::from_secs(20));
    assert_eq!(attribution.fetch_limit, 50);
    assert_eq!(attribution.default_timeout(), Duration::from_secs(6));
    assert_eq!(attribution.kick_timeout(), Duration::from_secs(3));
    assert_eq!(attribution.suppression_window(), Duration::from_secs(4));
    assert!(attribution.reason_attribution);

    let mut roles = config.mute_roles();
    roles.sort();
    assert_eq!(
        roles,
        vec![
            (Snowflake(1000), Snowflake(2000)),
            (Snowflake(1001), Snowflake(2001))
        ]
    );
}

#[test]
fn minimal_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("bot_user_id = 5").expect("config parses");

    assert_eq!(config.log_channel_id, None);
    assert_eq!(config.platform.api_base, "https://discord.com/api/v10");
    assert_eq!(config.platform.request_timeout_seconds, 10);
    assert_eq!(config.attribution.poll_interval(), Duration::from_secs(2));
    assert_eq!(config.attribution.lookback(), Duration::from_secs(16));
    assert_eq!(config.attribution.fetch_limit, 100);
    assert_eq!(config.attribution.default_timeout(), Duration::from_secs(8));
    assert_eq!(config.attribution.kick_timeout(), Duration::from_secs(4));
    assert_eq!(config.attribution.suppression_window(), Duration::from_secs(5));
    assert!(!config.attribution.reason_attribution);
    assert!(config.mute_roles().is_empty());
}

#[test]
fn missing_bot_user_id_is_rejected() {
    let result = GlobalConfig::from_toml_str("[attribution]\nfetch_limit = 5");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn zero_poll_interval_is_rejected() {
    let result = GlobalConfig::from_toml_str("bot_user_id = 5\n[attribution]\npoll_interval_ms = 0");
    let err = result.expect_err("zero interval rejected");
    assert!(err.to_string().contains("poll_interval_ms"));
}

#[test]
fn zero_fetch_limit_is_rejected() {
    let result = GlobalConfig::from_toml_str("bot_user_id = 5\n[attribution]\nfetch_limit = 0");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn zero_timeout_is_rejected() {
    let result = GlobalConfig::from_toml_str("bot_user_id = 5\n[attribution]\nkick_timeout_seconds = 0");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn durations_longer_than_a_day_are_rejected() {
    for (section, field) in [
        ("attribution", "suppression_window_seconds"),
        ("attribution", "default_timeout_seconds"),
        ("attribution", "lookback_seconds"),
        ("platform", "request_timeout_seconds"),
    ] {
        let raw = format!("bot_user_id = 5\n[{section}]\n{field} = 9223372036854775807");
        let err = GlobalConfig::from_toml_str(&raw).expect_err("huge duration rejected");
        assert!(err.to_string().contains(field), "{field}: {err}");
    }

    let raw = "bot_user_id = 5\n[attribution]\npoll_interval_ms = 90000000";
    assert!(matches!(GlobalConfig::from_toml_str(raw), Err(AppError::Config(_))));

    let raw = "bot_user_id = 5\n[attribution]\ndefault_timeout_seconds = 86400";
    assert!(GlobalConfig::from_toml_str(raw).is_ok());
}

#[test]
fn trailing_slash_in_api_base_is_rejected() {
    let result =
        GlobalConfig::from_toml_str("bot_user_id = 5\n[platform]\napi_base = \"https://x/api/\"");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn non_numeric_mute_role_guild_is_rejected() {
    let result = GlobalConfig::from_toml_str("bot_user_id = 5\n[mute_roles]\nlobby = 7");
    let err = result.expect_err("bad guild key rejected");
    assert!(err.to_string().contains("lobby"));
}

#[test]
fn load_from_path_reads_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, sample_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("config loads");
    assert_eq!(config.attribution.fetch_limit, 50);
}

#[test]
fn load_from_missing_path_is_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(temp.path().join("absent.toml"));

    let err = result.expect_err("missing file rejected");
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().starts_with("config: failed to read config"));
}
