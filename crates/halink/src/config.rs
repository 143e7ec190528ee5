//! CLI configuration: thin wrapper around `halink_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides (--url,
//! --token, --insecure, --timeout).

use std::time::Duration;

use secrecy::SecretString;

use halink_core::{ConnectionConfig, Credentials, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use halink_config::{Config, Profile, config_path, load_config, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

fn parse_url(raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Connection tuning and credentials for the active profile, with flag
/// overrides applied (flag > env > profile).
pub fn resolve_connection(
    global: &GlobalOpts,
) -> Result<(ConnectionConfig, Credentials), CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let (mut conn, credentials) = if let Some(profile) = cfg.profiles.get(&profile_name) {
        let conn = halink_config::profile_to_connection_config(profile)?;
        let url = parse_url(global.url.as_deref().unwrap_or(&profile.url))?;
        let token = match global.token {
            Some(ref token) => SecretString::from(token.clone()),
            None => halink_config::resolve_token(profile, &profile_name)?,
        };
        (conn, Credentials { url, token })
    } else {
        // No profile: build from CLI flags / env vars alone
        let url_str = global.url.as_deref().ok_or_else(|| CliError::NoConfig {
            path: config_path().display().to_string(),
        })?;
        let token = global
            .token
            .clone()
            .ok_or_else(|| CliError::NoCredentials {
                profile: profile_name.clone(),
            })?;
        (
            ConnectionConfig::default(),
            Credentials {
                url: parse_url(url_str)?,
                token: SecretString::from(token),
            },
        )
    };

    if global.insecure || cfg.defaults.insecure {
        conn.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(timeout) = global.timeout {
        conn.request_timeout = Duration::from_secs(timeout);
    }

    Ok((conn, credentials))
}
