//! Shared configuration for the halink CLI.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), a
//! keyring-backed [`CredentialStore`], and translation to
//! `halink_core::ConnectionConfig`. Core never reads files; it receives a
//! pre-built config and credentials from here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use halink_core::credentials::{CredentialError, CredentialStore, TOKEN_KEY, URL_KEY};
use halink_core::{ConnectionConfig, Credentials, ReconnectPolicy, TlsVerification};

/// Keyring service name for every stored secret.
pub const KEYRING_SERVICE: &str = "halink";

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "HALINK_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named instance profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named Home Assistant instance.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Instance base URL (e.g., "http://homeassistant.local:8123").
    pub url: String,

    /// Long-lived access token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the access token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS verification.
    pub insecure: Option<bool>,

    /// HTTP request timeout in seconds.
    pub timeout: Option<u64>,

    /// Liveness probe timeout in milliseconds.
    pub ping_timeout_ms: Option<u64>,

    pub reconnect_initial_ms: Option<u64>,
    pub reconnect_max_ms: Option<u64>,
    pub reconnect_growth: Option<f64>,
    pub reconnect_attempts: Option<u32>,

    /// Entity domains that get live push updates.
    pub dashboard_domains: Option<Vec<String>>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `$HALINK_CONFIG`, else XDG / platform
/// conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("io", "halink", "halink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("halink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + `HALINK__`-style environment keys
/// (`HALINK_DEFAULTS__OUTPUT=json`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HALINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

fn keyring_entry(profile_name: &str, key: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/{key}"),
    )?)
}

/// Resolve the access token from the credential chain (no CLI flag step).
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(profile, profile_name, |name| std::env::var(name).ok())
}

/// [`resolve_token`] with an explicit environment lookup.
pub fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Some(val) = env(env_name).filter(|v| !v.is_empty()) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name, "token") {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store the access token for `profile_name` in the system keyring.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name, "token")?.set_password(token)?;
    Ok(())
}

/// Remove the keyring token of `profile_name`; missing entries are fine.
pub fn delete_token(profile_name: &str) -> Result<(), ConfigError> {
    match keyring_entry(profile_name, "token")?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ── Translation to core types ───────────────────────────────────────

fn parse_url(raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a `ConnectionConfig` from a profile. Unset fields keep core
/// defaults.
pub fn profile_to_connection_config(profile: &Profile) -> Result<ConnectionConfig, ConfigError> {
    let defaults = ConnectionConfig::default();
    let policy = ReconnectPolicy::default();

    let growth = profile.reconnect_growth.unwrap_or(policy.growth);
    if !growth.is_finite() || growth < 1.0 {
        return Err(ConfigError::Validation {
            field: "reconnect_growth".into(),
            reason: format!("must be a finite number >= 1.0, got {growth}"),
        });
    }

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    Ok(ConnectionConfig {
        ping_timeout: profile
            .ping_timeout_ms
            .map_or(defaults.ping_timeout, Duration::from_millis),
        request_timeout: profile
            .timeout
            .map_or(defaults.request_timeout, Duration::from_secs),
        reconnect: ReconnectPolicy {
            initial_delay: profile
                .reconnect_initial_ms
                .map_or(policy.initial_delay, Duration::from_millis),
            growth,
            max_delay: profile
                .reconnect_max_ms
                .map_or(policy.max_delay, Duration::from_millis),
            max_attempts: profile.reconnect_attempts.unwrap_or(policy.max_attempts),
        },
        dashboard_domains: profile
            .dashboard_domains
            .clone()
            .unwrap_or(defaults.dashboard_domains),
        tls,
        ..defaults
    })
}

/// Instance URL + resolved token of a profile.
pub fn profile_credentials(profile: &Profile, profile_name: &str) -> Result<Credentials, ConfigError> {
    Ok(Credentials {
        url: parse_url(&profile.url)?,
        token: resolve_token(profile, profile_name)?,
    })
}

// ── Keyring credential store ────────────────────────────────────────

/// [`CredentialStore`] backed by the OS keyring, one entry per key under
/// `<profile>/<key>`.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    profile: String,
}

impl KeyringCredentialStore {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    fn entry(&self, key: &str) -> keyring::Result<keyring::Entry> {
        keyring::Entry::new(
            KEYRING_SERVICE,
            &format!("{}/{}", self.profile, store_entry_name(key)),
        )
    }
}

/// Keyring entry suffix for a credential store key. The token shares the
/// entry read by [`resolve_token`].
fn store_entry_name(key: &str) -> &str {
    match key {
        TOKEN_KEY => "token",
        URL_KEY => "url",
        other => other,
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entry(key).ok()?.get_password().ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.entry(key)
            .and_then(|entry| entry.set_password(value))
            .map_err(|e| CredentialError::write(key, e))
    }

    fn remove(&self, key: &str) -> Result<(), CredentialError> {
        let entry = self.entry(key).map_err(|e| CredentialError::remove(key, e))?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::remove(key, e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn profile() -> Profile {
        Profile {
            url: "http://ha.local:8123".into(),
            ..Profile::default()
        }
    }

    #[test]
    fn token_env_wins_over_plaintext() {
        let profile = Profile {
            token: Some("plain".into()),
            token_env: Some("HA_TOKEN_TEST".into()),
            ..profile()
        };
        let token = resolve_token_with(&profile, "halink-test-env", |name| {
            (name == "HA_TOKEN_TEST").then(|| "from-env".to_string())
        })
        .unwrap();
        assert_eq!(token.expose_secret(), "from-env");
    }

    #[test]
    fn empty_env_falls_through_to_plaintext() {
        let profile = Profile {
            token: Some("plain".into()),
            token_env: Some("HA_TOKEN_TEST".into()),
            ..profile()
        };
        let token =
            resolve_token_with(&profile, "halink-test-empty", |_| Some(String::new())).unwrap();
        assert_eq!(token.expose_secret(), "plain");
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = resolve_token_with(&profile(), "halink-test-missing", |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { ref profile } if profile == "halink-test-missing"));
    }

    #[test]
    fn empty_profile_keeps_core_defaults() {
        let config = profile_to_connection_config(&profile()).unwrap();
        let defaults = ConnectionConfig::default();
        assert_eq!(config.ping_timeout, defaults.ping_timeout);
        assert_eq!(config.reconnect, defaults.reconnect);
        assert_eq!(config.dashboard_domains, defaults.dashboard_domains);
        assert_eq!(config.tls, TlsVerification::SystemDefaults);
    }

    #[test]
    fn profile_overrides_reach_connection_config() {
        let profile = Profile {
            insecure: Some(true),
            ping_timeout_ms: Some(1500),
            reconnect_initial_ms: Some(100),
            reconnect_max_ms: Some(400),
            reconnect_growth: Some(2.0),
            reconnect_attempts: Some(5),
            dashboard_domains: Some(vec!["light".into()]),
            ..profile()
        };
        let config = profile_to_connection_config(&profile).unwrap();
        assert_eq!(config.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(config.ping_timeout, Duration::from_millis(1500));
        assert_eq!(config.reconnect.delay(3), Duration::from_millis(400));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.dashboard_domains, vec!["light".to_string()]);
    }

    #[test]
    fn shrinking_backoff_is_rejected() {
        let profile = Profile {
            reconnect_growth: Some(0.5),
            ..profile()
        };
        let err = profile_to_connection_config(&profile).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "reconnect_growth"));
    }

    #[test]
    fn store_token_key_shares_the_resolved_entry() {
        assert_eq!(store_entry_name(TOKEN_KEY), "token");
        assert_eq!(store_entry_name(URL_KEY), "url");
        assert_eq!(store_entry_name("other"), "other");
    }

    #[test]
    fn bad_url_is_a_validation_error() {
        let profile = Profile {
            url: "not a url".into(),
            token: Some("t".into()),
            ..Profile::default()
        };
        let err = profile_credentials(&profile, "halink-test-url").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "url"));
    }
}
