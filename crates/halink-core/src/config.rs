// ── Runtime connection configuration ──
//
// These types describe *how* to keep a Home Assistant session alive.
// They carry connection tuning and credential data, but never touch disk.
// The CLI builds a `ConnectionConfig` and hands it to the `Controller`.

use std::path::PathBuf;
use std::time::Duration;

use halink_api::{TlsMode, TransportConfig};
use secrecy::SecretString;
use url::Url;

/// Domains whose entities get live push updates by default.
pub const DEFAULT_DASHBOARD_DOMAINS: [&str; 4] = ["input_boolean", "switch", "light", "input_number"];

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// Bundled webpki roots (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed local instances).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => Self::System,
            TlsVerification::CustomCa(path) => Self::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => Self::DangerAcceptInvalid,
        }
    }
}

/// Exponential backoff for the reconnect loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub growth: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(2000),
            growth: 1.5,
            max_delay: Duration::from_millis(5000),
            max_attempts: 60,
        }
    }
}

impl ReconnectPolicy {
    /// Delay after failed attempt `attempt` (1-based):
    /// `min(initial * growth^(attempt-1), max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.growth.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }
}

/// Connection tuning for one Home Assistant instance.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Liveness probe timeout used by `verify_connection`.
    pub ping_timeout: Duration,
    /// Bound on websocket open + auth.
    pub handshake_timeout: Duration,
    /// Per-request timeout of the scheduler HTTP channel.
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Entity domains included in the dashboard push subscription.
    pub dashboard_domains: Vec<String>,
    pub tls: TlsVerification,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ping_timeout: Duration::from_millis(3000),
            handshake_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            dashboard_domains: DEFAULT_DASHBOARD_DOMAINS.iter().map(|d| (*d).to_owned()).collect(),
            tls: TlsVerification::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.request_timeout,
            handshake_timeout: self.handshake_timeout,
        }
    }
}

/// Endpoint and long-lived access token of one instance.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub url: Url,
    pub token: SecretString,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(2000));
        assert_eq!(policy.delay(2), Duration::from_millis(3000));
        assert_eq!(policy.delay(3), Duration::from_millis(4500));
        assert_eq!(policy.delay(4), Duration::from_millis(5000));
        assert_eq!(policy.delay(60), Duration::from_millis(5000));
    }

    #[test]
    fn backoff_survives_huge_attempts() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(u32::MAX), policy.max_delay);
    }

    #[test]
    fn defaults_match_dashboard_domains() {
        let config = ConnectionConfig::default();
        assert_eq!(config.dashboard_domains.len(), 4);
        assert!(config.dashboard_domains.iter().any(|d| d == "input_number"));
        assert_eq!(config.ping_timeout, Duration::from_secs(3));
    }
}
