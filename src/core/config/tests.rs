use super::data::{Config, ProviderConfig};
use super::io::ConfigError;
use crate::core::error::ChatError;
use crate::core::message::ChatMode;
use crate::core::providers::{ProviderKind, DEFAULT_REQUEST_TIMEOUT};
use crate::core::quotes::QuotePolicy;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.default_mode(), ChatMode::Smart);
    assert_eq!(config.user_id(), "default_user");
    assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
    assert_eq!(config.quote_policy(), QuotePolicy::default());
}

#[test]
fn test_config_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config {
        default_provider: Some("anthropic".to_string()),
        default_mode: Some(ChatMode::Comfort),
        user_id: Some("alice".to_string()),
        request_timeout_secs: Some(45),
        ..Default::default()
    };
    config.set_default_model(ProviderKind::Anthropic, "claude-sonnet-4");
    config.provider_mut(ProviderKind::OpenAiCompatible).base_url =
        Some("http://127.0.0.1:8000/v1".to_string());
    config.quote.cap = Some(0.3);

    config
        .save_to_path(&config_path)
        .expect("Failed to save config");
    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded, config);
    assert_eq!(loaded.request_timeout(), Duration::from_secs(45));
    assert_eq!(loaded.quote_policy().cap, 0.3);
    assert_eq!(loaded.quote_policy().base, QuotePolicy::default().base);

    // Unsetting persists as absence.
    let mut config = loaded;
    config.set_default_model(ProviderKind::Anthropic, "  ");
    config
        .save_to_path(&config_path)
        .expect("Failed to save modified config");
    let loaded = Config::load_from_path(&config_path).expect("Failed to reload config");
    assert_eq!(
        loaded
            .provider(ProviderKind::Anthropic)
            .and_then(|p| p.model.as_deref()),
        None
    );
    assert_eq!(loaded.default_mode(), ChatMode::Comfort);
}

#[test]
fn parses_hand_written_toml() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
default_provider = "openai-compatible"
default_mode = "夸夸"

[quote]
base = 0.2

[[providers]]
kind = "openai-compatible"
model = "qwen2.5:7b"

[[providers]]
kind = "openai"
api_key = "sk-test"
"#,
    )
    .expect("write config");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(
        config.default_provider_kind(),
        Ok(Some(ProviderKind::OpenAiCompatible))
    );
    assert_eq!(config.default_mode(), ChatMode::Praise);
    assert_eq!(config.quote_policy().base, 0.2);
    assert_eq!(
        config
            .provider(ProviderKind::OpenAiCompatible)
            .and_then(|p| p.model.as_deref()),
        Some("qwen2.5:7b")
    );
    assert!(!format!("{:?}", config.provider(ProviderKind::OpenAi)).contains("sk-test"));
}

#[test]
fn invalid_toml_reports_parse_error_with_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "default_mode = [").expect("write config");

    let err = Config::load_from_path(&config_path).expect_err("should fail");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("Failed to parse config"));
}

#[test]
fn unknown_provider_values_are_rejected() {
    let config = Config {
        default_provider: Some("gemini".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        config.default_provider_kind(),
        Err(ChatError::Configuration(_))
    ));

    let parsed: Result<Config, _> = toml::from_str("[[providers]]\nkind = \"gemini\"\n");
    assert!(parsed.is_err());
}

#[test]
fn provider_mut_does_not_duplicate_entries() {
    let mut config = Config::default();
    config.set_default_model(ProviderKind::OpenAi, "gpt-4o");
    config.set_default_model(ProviderKind::OpenAi, "gpt-4o-mini");
    assert_eq!(config.providers.len(), 1);
    assert_eq!(
        config.providers[0],
        ProviderConfig {
            model: Some("gpt-4o-mini".to_string()),
            ..ProviderConfig::new(ProviderKind::OpenAi)
        }
    );
}

#[test]
fn out_of_range_quote_values_are_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[quote]\nbase = 0.2\ncap = 1.5\n").expect("write config");

    let err = Config::load_from_path(&config_path).expect_err("should fail");
    assert!(matches!(err, ConfigError::Invalid { .. }));
    assert!(err.to_string().contains("quote.cap"));
}

#[test]
fn save_into_missing_directory_creates_it() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("dir").join("config.toml");
    let config = Config {
        user_id: Some("小明".to_string()),
        ..Default::default()
    };

    config.save_to_path(&config_path).expect("save");
    let loaded = Config::load_from_path(&config_path).expect("reload");
    assert_eq!(loaded.user_id(), "小明");
}

#[test]
fn save_over_a_directory_reports_write_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let err = Config::default()
        .save_to_path(temp_dir.path())
        .expect_err("directory is not a file");
    assert!(matches!(err, ConfigError::Write { .. }));
}
