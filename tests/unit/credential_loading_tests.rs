//! Unit tests for bot token loading.
//!
//! The keychain service `modwatch` is absent in CI, so these tests
//! exercise the environment variable fallback.
//!
//! NOTE: These tests mutate process-global env vars and must run serially.

use modwatch::config::GlobalConfig;

fn make_config() -> GlobalConfig {
    GlobalConfig::from_toml_str("bot_user_id = 5").expect("config parses")
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn env_var_token_is_loaded() {
    let mut config = make_config();
    unsafe {
        std::env::set_var("MODWATCH_BOT_TOKEN", "test-bot-token");
    }

    let result = config.load_credentials().await;
    assert!(result.is_ok(), "load_credentials should succeed: {result:?}");
    assert_eq!(config.platform.bot_token, "test-bot-token");

    unsafe {
        std::env::remove_var("MODWATCH_BOT_TOKEN");
    }
}

/// Missing token produces an error naming both sources.
#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn missing_token_error_names_both_sources() {
    let mut config = make_config();
    unsafe {
        std::env::remove_var("MODWATCH_BOT_TOKEN");
    }

    let err = config
        .load_credentials()
        .await
        .expect_err("no credential source exists");
    let message = err.to_string();

    assert!(message.contains("modwatch"), "names keychain service: {message}");
    assert!(message.contains("MODWATCH_BOT_TOKEN"), "names env var: {message}");
    assert!(config.platform.bot_token.is_empty());
}

/// Empty env var is treated as absent.
#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn empty_env_var_is_treated_as_absent() {
    let mut config = make_config();
    unsafe {
        std::env::set_var("MODWATCH_BOT_TOKEN", "  ");
    }

    let result = config.load_credentials().await;
    assert!(result.is_err(), "blank token must not be accepted");

    unsafe {
        std::env::remove_var("MODWATCH_BOT_TOKEN");
    }
}
