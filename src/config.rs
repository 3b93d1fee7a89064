//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Rate Limiting
//!
//! - `LIMITER_ENABLED`: Toggle the per-client limiter (default: true)
//! - `LIMITER_RPS`: Sustained requests per second per client (default: 2)
//! - `LIMITER_BURST`: Bucket capacity per client (default: 4)
//! - `LIMITER_SWEEP_INTERVAL_SECS` / `LIMITER_CLIENT_RETENTION_SECS`: idle
//!   client eviction (defaults: 60 / 180)
//! - `CLIENT_IP_SOURCE`: `peer` (socket address) or `forwarded`
//!   (`X-Forwarded-For` / `X-Real-IP` from trusted proxies)
//!
//! # Security Configuration
//!
//! - `CORS_TRUSTED_ORIGINS`: Origins reflected in CORS responses, comma or
//!   whitespace separated (default: none)
//! - `TRUSTED_PROXIES`: CIDR ranges allowed to set forwarding headers
//! - `DEMO_AUTH_TOKEN`: Seeds an activated demo user reachable with this token

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::middleware::ip::CidrRange;
use crate::validation::validate_token_plaintext;

/// Where the rate limiter takes a client's identity from.
///
/// Trusting a forwarding header changes the limiter's security properties,
/// so this is always an explicit choice and never a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientIpSource {
    /// The TCP peer address of the connection.
    #[default]
    PeerAddress,
    /// The first `X-Forwarded-For` entry (or `X-Real-IP`), honoured only when
    /// the peer is a trusted proxy.
    ForwardedHeader,
}

impl FromStr for ClientIpSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "peer" => Ok(ClientIpSource::PeerAddress),
            "forwarded" => Ok(ClientIpSource::ForwardedHeader),
            other => Err(format!("expected 'peer' or 'forwarded', got '{other}'")),
        }
    }
}

impl fmt::Display for ClientIpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientIpSource::PeerAddress => write!(f, "peer"),
            ClientIpSource::ForwardedHeader => write!(f, "forwarded"),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 4000)
    pub port: u16,

    /// Environment label reported by the health check (default: "development")
    pub environment: String,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Whether the per-client limiter is active (default: true)
    pub limiter_enabled: bool,

    /// Sustained requests per second per client (default: 2.0)
    pub limiter_rps: f64,

    /// Bucket capacity per client (default: 4)
    pub limiter_burst: u32,

    /// How often idle clients are swept (default: 60s)
    pub limiter_sweep_interval: Duration,

    /// Idle time before a client entry is evicted (default: 180s).
    /// Must be greater than the sweep interval.
    pub limiter_client_retention: Duration,

    /// Source of the client identity (default: peer address)
    pub client_ip_source: ClientIpSource,

    /// Trusted proxy CIDR ranges. With `CLIENT_IP_SOURCE=forwarded`, forwarding
    /// headers are honoured only from these networks (all peers when empty).
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Origins reflected in `Access-Control-Allow-Origin`, in configured order.
    /// Matching is exact; there is no wildcard.
    pub cors_trusted_origins: Vec<String>,

    /// Bearer token for a seeded, activated demo user with movie permissions
    pub demo_auth_token: Option<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (default: 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse or the
    /// combination is inconsistent (see [`Config::validate`]).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 4000)?,
            environment: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?, // 1MB

            // Rate limiting
            limiter_enabled: Self::parse_env("LIMITER_ENABLED", true)?,
            limiter_rps: Self::parse_env("LIMITER_RPS", 2.0)?,
            limiter_burst: Self::parse_env("LIMITER_BURST", 4)?,
            limiter_sweep_interval: Duration::from_secs(Self::parse_env(
                "LIMITER_SWEEP_INTERVAL_SECS",
                60,
            )?),
            limiter_client_retention: Duration::from_secs(Self::parse_env(
                "LIMITER_CLIENT_RETENTION_SECS",
                180,
            )?),
            client_ip_source: Self::parse_env("CLIENT_IP_SOURCE", ClientIpSource::PeerAddress)?,
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES"),

            // Security
            cors_trusted_origins: Self::parse_list("CORS_TRUSTED_ORIGINS"),
            demo_auth_token: env::var("DEMO_AUTH_TOKEN").ok().filter(|t| !t.is_empty()),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", 0)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.limiter_enabled {
            if !self.limiter_rps.is_finite() || self.limiter_rps <= 0.0 {
                return Err(AppError::ConfigError(format!(
                    "LIMITER_RPS must be a positive number, got {}",
                    self.limiter_rps
                )));
            }

            if self.limiter_burst == 0 {
                return Err(AppError::ConfigError(
                    "LIMITER_BURST must be greater than 0".to_string(),
                ));
            }
        }

        if self.limiter_sweep_interval.is_zero() {
            return Err(AppError::ConfigError(
                "LIMITER_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.limiter_client_retention <= self.limiter_sweep_interval {
            return Err(AppError::ConfigError(format!(
                "LIMITER_CLIENT_RETENTION_SECS ({:?}) must be greater than LIMITER_SWEEP_INTERVAL_SECS ({:?})",
                self.limiter_client_retention, self.limiter_sweep_interval
            )));
        }

        if let Some(invalid) = self
            .trusted_proxies
            .iter()
            .find(|cidr| CidrRange::parse(cidr).is_none())
        {
            return Err(AppError::ConfigError(format!(
                "TRUSTED_PROXIES entry '{invalid}' is not a valid CIDR range or IP address"
            )));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if let Some(token) = &self.demo_auth_token
            && validate_token_plaintext(token).is_err()
        {
            // The value itself stays out of the message
            return Err(AppError::ConfigError(
                "DEMO_AUTH_TOKEN must be 26 base32 characters".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Read a list variable, splitting on commas and whitespace and keeping order.
    fn parse_list(name: &str) -> Vec<String> {
        env::var(name)
            .map(|raw| split_list(&raw))
            .unwrap_or_default()
    }
}

/// Split a comma- or whitespace-separated list, dropping empty items.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 4000,
            environment: "development".to_string(),
            max_request_body_size: 1024 * 1024, // 1MB
            // Rate limiting
            limiter_enabled: true,
            limiter_rps: 2.0,
            limiter_burst: 4,
            limiter_sweep_interval: Duration::from_secs(60),
            limiter_client_retention: Duration::from_secs(180),
            client_ip_source: ClientIpSource::PeerAddress,
            trusted_proxies: vec![],
            // Security
            cors_trusted_origins: vec![],
            demo_auth_token: None,
            // Observability
            metrics_port: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.port, 4000);
        assert!(config.limiter_enabled);
        assert_eq!(config.limiter_rps, 2.0);
        assert_eq!(config.limiter_burst, 4);
        assert_eq!(config.client_ip_source, ClientIpSource::PeerAddress);
        assert!(config.cors_trusted_origins.is_empty());
        assert!(!config.metrics_enabled());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_validate_retention_must_exceed_sweep_interval() {
        let config = Config {
            limiter_sweep_interval: Duration::from_secs(60),
            limiter_client_retention: Duration::from_secs(60),
            ..Config::default()
        };

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("LIMITER_CLIENT_RETENTION_SECS")
        );
    }

    #[test]
    fn test_validate_zero_sweep_interval() {
        let config = Config {
            limiter_sweep_interval: Duration::ZERO,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rps_must_be_positive_when_enabled() {
        for rps in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = Config {
                limiter_rps: rps,
                ..Config::default()
            };
            assert!(config.validate().is_err(), "rps {rps} should be rejected");
        }

        // Irrelevant while the limiter is off
        let config = Config {
            limiter_enabled: false,
            limiter_rps: 0.0,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_burst_zero() {
        let config = Config {
            limiter_burst: 0,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("LIMITER_BURST"));
    }

    #[test]
    fn test_validate_demo_token_shape() {
        let config = Config {
            demo_auth_token: Some("not-a-token".to_string()),
            ..Config::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("DEMO_AUTH_TOKEN"));
        assert!(!err.contains("not-a-token"));

        let config = Config {
            demo_auth_token: Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_trusted_proxies() {
        let config = Config {
            trusted_proxies: vec!["10.0.0.0/8".to_string(), "::1".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        for bad in ["10.0.0.0/33", "not-a-cidr", "10.0.0.0/8/8"] {
            let config = Config {
                client_ip_source: ClientIpSource::ForwardedHeader,
                trusted_proxies: vec!["172.16.0.0/12".to_string(), bad.to_string()],
                ..Config::default()
            };
            let err = config.validate().unwrap_err().to_string();
            assert!(err.contains("TRUSTED_PROXIES"), "{bad}: {err}");
            assert!(err.contains(bad), "{bad}: {err}");
        }
    }

    #[test]
    fn test_client_ip_source_parsing() {
        assert_eq!(
            "peer".parse::<ClientIpSource>().unwrap(),
            ClientIpSource::PeerAddress
        );
        assert_eq!(
            " Forwarded ".parse::<ClientIpSource>().unwrap(),
            ClientIpSource::ForwardedHeader
        );
        assert!("xff".parse::<ClientIpSource>().is_err());
        assert_eq!(ClientIpSource::ForwardedHeader.to_string(), "forwarded");
    }

    #[test]
    fn test_split_list_keeps_order() {
        assert_eq!(
            split_list("https://a.example, https://b.example  https://c.example"),
            vec![
                "https://a.example".to_string(),
                "https://b.example".to_string(),
                "https://c.example".to_string(),
            ]
        );
        assert!(split_list(" , ").is_empty());
    }
}
