//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.line-relay/config.json`) and environment.
//! Credentials set in the environment override the file; nothing is validated upfront, so a
//! missing secret only surfaces when the client that needs it is first used.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// LINE Messaging API credentials and endpoint.
    #[serde(default)]
    pub line: LineConfig,

    /// Blob storage account, container and key layout.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Request handling policy.
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Server bind, port, and webhook route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 7071).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Route the LINE platform POSTs webhook events to (default "/api/linebot").
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

fn default_gateway_port() -> u16 {
    7071
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_path() -> String {
    "/api/linebot".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            webhook_path: default_webhook_path(),
        }
    }
}

/// LINE channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineConfig {
    /// Channel secret used to verify X-Line-Signature. Overridden by LINE_CHANNEL_SECRET env.
    pub channel_secret: Option<String>,
    /// Long-lived channel access token for the reply API. Overridden by LINE_CHANNEL_ACCESS_TOKEN env.
    pub channel_access_token: Option<String>,
    /// Messaging API base URL (default https://api.line.me). Useful for tests.
    pub api_base: Option<String>,
}

/// Storage account and blob layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Overridden by STORAGE_ACCOUNT_NAME env.
    pub account_name: Option<String>,
    /// Base64 account key. Overridden by STORAGE_ACCOUNT_KEY env.
    pub account_key: Option<String>,
    /// Container events are written to (default "raw-zone").
    #[serde(default = "default_container")]
    pub container: String,
    /// Blob service endpoint. Defaults to https://{accountName}.blob.core.windows.net; set for Azurite
    /// (e.g. "http://127.0.0.1:10000/devstoreaccount1").
    pub endpoint: Option<String>,
    /// First segment of every blob key (default "linebot").
    #[serde(default = "default_system_name")]
    pub system_name: String,
    /// Timezone for the date/hour/minute partitions (default "Japan"). Only zones without
    /// daylight saving are accepted: "Japan", "Asia/Tokyo", "JST", "UTC", "Etc/UTC", "GMT", or a
    /// fixed offset like "+09:00". Other IANA names (e.g. "Europe/Berlin") are rejected at startup.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_container() -> String {
    "raw-zone".to_string()
}

fn default_system_name() -> String {
    "linebot".to_string()
}

fn default_timezone() -> String {
    "Japan".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            account_name: None,
            account_key: None,
            container: default_container(),
            endpoint: None,
            system_name: default_system_name(),
            timezone: default_timezone(),
        }
    }
}

/// Request handling policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// How per-event storage results combine into the request outcome.
    #[serde(default)]
    pub aggregate: AggregatePolicy,
}

/// How the outcomes of several blob writes in one request are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregatePolicy {
    /// Success only when every write succeeded.
    #[default]
    All,

    /// Success follows the last write attempted in the request.
    Last,
}

/// Trimmed, non-empty value of an env var.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_value(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the channel secret: env LINE_CHANNEL_SECRET overrides config.
pub fn resolve_channel_secret(config: &Config) -> Option<String> {
    env_value("LINE_CHANNEL_SECRET").or_else(|| config_value(config.line.channel_secret.as_ref()))
}

/// Resolve the channel access token: env LINE_CHANNEL_ACCESS_TOKEN overrides config.
pub fn resolve_channel_access_token(config: &Config) -> Option<String> {
    env_value("LINE_CHANNEL_ACCESS_TOKEN")
        .or_else(|| config_value(config.line.channel_access_token.as_ref()))
}

/// Resolve the storage account name: env STORAGE_ACCOUNT_NAME overrides config.
pub fn resolve_storage_account_name(config: &Config) -> Option<String> {
    env_value("STORAGE_ACCOUNT_NAME")
        .or_else(|| config_value(config.storage.account_name.as_ref()))
}

/// Resolve the storage account key: env STORAGE_ACCOUNT_KEY overrides config.
pub fn resolve_storage_account_key(config: &Config) -> Option<String> {
    env_value("STORAGE_ACCOUNT_KEY").or_else(|| config_value(config.storage.account_key.as_ref()))
}

/// Replace the four credentials in `config` with their resolved values (env first, then file).
/// Blank values become None.
pub fn apply_env_overrides(config: &mut Config) {
    config.line.channel_secret = resolve_channel_secret(config);
    config.line.channel_access_token = resolve_channel_access_token(config);
    config.storage.account_name = resolve_storage_account_name(config);
    config.storage.account_key = resolve_storage_account_key(config);
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".line-relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, RELAY_CONFIG_PATH, or the default. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Serializes tests that set or remove process env vars.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    const CREDENTIAL_VARS: [&str; 4] = [
        "LINE_CHANNEL_SECRET",
        "LINE_CHANNEL_ACCESS_TOKEN",
        "STORAGE_ACCOUNT_NAME",
        "STORAGE_ACCOUNT_KEY",
    ];

    fn clear_credential_vars() {
        for name in CREDENTIAL_VARS {
            std::env::remove_var(name);
        }
    }

    fn file_credentials() -> Config {
        let mut c = Config::default();
        c.line.channel_secret = Some("file-secret".to_string());
        c.line.channel_access_token = Some("file-token".to_string());
        c.storage.account_name = Some("fileaccount".to_string());
        c.storage.account_key = Some("ZmlsZS1rZXk=".to_string());
        c
    }

    #[test]
    fn defaults_match_deployment_layout() {
        let c = Config::default();
        assert_eq!(c.gateway.port, 7071);
        assert_eq!(c.gateway.bind, "127.0.0.1");
        assert_eq!(c.gateway.webhook_path, "/api/linebot");
        assert_eq!(c.storage.container, "raw-zone");
        assert_eq!(c.storage.system_name, "linebot");
        assert_eq!(c.storage.timezone, "Japan");
        assert_eq!(c.relay.aggregate, AggregatePolicy::All);
    }

    #[test]
    fn parses_camel_case_sections() {
        let c: Config = serde_json::from_str(
            r#"{
                "gateway": {"port": 8080, "webhookPath": "/hook"},
                "line": {"channelSecret": "s", "apiBase": "http://localhost:1"},
                "storage": {"accountName": "acct", "container": "c", "timezone": "UTC"},
                "relay": {"aggregate": "last"}
            }"#,
        )
        .unwrap();
        assert_eq!(c.gateway.port, 8080);
        assert_eq!(c.gateway.bind, "127.0.0.1");
        assert_eq!(c.gateway.webhook_path, "/hook");
        assert_eq!(c.line.channel_secret.as_deref(), Some("s"));
        assert_eq!(c.storage.account_name.as_deref(), Some("acct"));
        assert_eq!(c.storage.container, "c");
        assert_eq!(c.storage.system_name, "linebot");
        assert_eq!(c.relay.aggregate, AggregatePolicy::Last);
    }

    #[test]
    fn blank_config_values_resolve_to_none() {
        assert_eq!(config_value(Some(&"  ".to_string())), None);
        assert_eq!(config_value(Some(&" x ".to_string())), Some("x".to_string()));
        assert_eq!(config_value(None), None);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.gateway.port, 7071);
    }

    #[test]
    fn load_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_config(Some(path)).is_err());
    }

    #[test]
    fn env_overrides_file_credentials() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_credential_vars();
        let c = file_credentials();

        std::env::set_var("LINE_CHANNEL_SECRET", " env-secret ");
        std::env::set_var("LINE_CHANNEL_ACCESS_TOKEN", "env-token");
        std::env::set_var("STORAGE_ACCOUNT_NAME", "envaccount");
        std::env::set_var("STORAGE_ACCOUNT_KEY", "ZW52LWtleQ==");
        let secret = resolve_channel_secret(&c);
        let token = resolve_channel_access_token(&c);
        let name = resolve_storage_account_name(&c);
        let key = resolve_storage_account_key(&c);
        clear_credential_vars();

        assert_eq!(secret.as_deref(), Some("env-secret"));
        assert_eq!(token.as_deref(), Some("env-token"));
        assert_eq!(name.as_deref(), Some("envaccount"));
        assert_eq!(key.as_deref(), Some("ZW52LWtleQ=="));
    }

    #[test]
    fn blank_env_values_fall_back_to_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_credential_vars();
        let c = file_credentials();

        for name in CREDENTIAL_VARS {
            std::env::set_var(name, "   ");
        }
        let secret = resolve_channel_secret(&c);
        let token = resolve_channel_access_token(&c);
        let name = resolve_storage_account_name(&c);
        let key = resolve_storage_account_key(&c);
        clear_credential_vars();

        assert_eq!(secret.as_deref(), Some("file-secret"));
        assert_eq!(token.as_deref(), Some("file-token"));
        assert_eq!(name.as_deref(), Some("fileaccount"));
        assert_eq!(key.as_deref(), Some("ZmlsZS1rZXk="));
    }

    #[test]
    fn unset_env_and_blank_file_resolve_to_none() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_credential_vars();
        let mut c = Config::default();
        c.line.channel_secret = Some(" ".to_string());
        assert_eq!(resolve_channel_secret(&c), None);
        assert_eq!(resolve_channel_access_token(&c), None);
        assert_eq!(resolve_storage_account_name(&c), None);
        assert_eq!(resolve_storage_account_key(&c), None);
    }

    #[test]
    fn apply_env_overrides_rewrites_credentials() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_credential_vars();
        let mut c = file_credentials();
        c.storage.account_key = Some("  ".to_string());

        std::env::set_var("LINE_CHANNEL_SECRET", "env-secret");
        apply_env_overrides(&mut c);
        clear_credential_vars();

        assert_eq!(c.line.channel_secret.as_deref(), Some("env-secret"));
        assert_eq!(c.line.channel_access_token.as_deref(), Some("file-token"));
        assert_eq!(c.storage.account_name.as_deref(), Some("fileaccount"));
        assert_eq!(c.storage.account_key, None);
    }
}
