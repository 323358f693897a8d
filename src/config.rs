//! Tunnelgate configuration.

use crate::TunnelgateError;
use std::path::PathBuf;
use std::time::Duration;

/// Default gateway address used when `SVPN_GATEWAY` is unset.
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8787";

/// Default interval between heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(7);

/// Default timeout applied to every gateway request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default namespace for per-user state (device id fallback, last code).
pub const DEFAULT_NAMESPACE: &str = "simplevpn";

/// Configuration for the licensing client and session controller.
#[derive(Debug, Clone)]
pub struct TunnelgateConfig {
    /// Base URL of the licensing gateway (e.g., "https://gw.example.com").
    pub gateway_url: String,

    /// Shared HMAC secret used to sign every gateway request.
    pub secret: String,

    /// Path to the tunneling engine executable (sing-box).
    pub engine_binary: PathBuf,

    /// Platform tag reported to the gateway ("windows", "macos", ...).
    pub platform: String,

    /// URI scheme accepted for connection descriptors (e.g., "vless").
    pub descriptor_scheme: String,

    /// Interval between heartbeats while connected.
    pub heartbeat_interval: Duration,

    /// Timeout for each gateway request.
    pub request_timeout: Duration,

    /// Namespace for per-user state directories.
    pub state_namespace: String,
}

impl Default for TunnelgateConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            secret: String::new(),
            engine_binary: default_engine_binary(),
            platform: platform_tag().to_string(),
            descriptor_scheme: crate::translate::DEFAULT_SCHEME.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            state_namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl TunnelgateConfig {
    /// Build a configuration from `SVPN_*` environment variables.
    ///
    /// - `SVPN_GATEWAY` - gateway base URL (default [`DEFAULT_GATEWAY_URL`])
    /// - `SVPN_SECRET` - shared signing secret (no default)
    /// - `SVPN_ENGINE` - engine executable path
    /// - `SVPN_HEARTBEAT_SECS` - heartbeat interval in seconds
    ///
    /// Missing values are not an error here; [`validate`](Self::validate)
    /// reports them when a connect is attempted.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(url) = non_empty_env("SVPN_GATEWAY") {
            config.gateway_url = url;
        }
        if let Some(secret) = non_empty_env("SVPN_SECRET") {
            config.secret = secret;
        }
        if let Some(engine) = non_empty_env("SVPN_ENGINE") {
            config.engine_binary = PathBuf::from(engine);
        }
        if let Some(secs) = non_empty_env("SVPN_HEARTBEAT_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) if secs > 0 => config.heartbeat_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %secs, "ignoring invalid SVPN_HEARTBEAT_SECS"),
            }
        }

        config
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), TunnelgateError> {
        if self.secret.is_empty() {
            return Err(TunnelgateError::ConfigError(
                "signing secret is not configured (set SVPN_SECRET)".to_string(),
            ));
        }
        if self.gateway_url.is_empty() {
            return Err(TunnelgateError::ConfigError(
                "gateway URL is not configured (set SVPN_GATEWAY)".to_string(),
            ));
        }
        let parsed = url::Url::parse(&self.gateway_url).map_err(|e| {
            TunnelgateError::ConfigError(format!("invalid gateway URL {}: {}", self.gateway_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TunnelgateError::ConfigError(format!(
                "gateway URL must be http or https, got {}",
                parsed.scheme()
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(TunnelgateError::ConfigError(
                "heartbeat_interval cannot be zero".to_string(),
            ));
        }
        if self.descriptor_scheme.is_empty() {
            return Err(TunnelgateError::ConfigError(
                "descriptor_scheme cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Platform tag reported to the gateway.
pub fn platform_tag() -> &'static str {
    match std::env::consts::OS {
        "windows" => "windows",
        "macos" => "macos",
        other => other,
    }
}

/// Default engine location: `bin/sing-box/sing-box[.exe]` next to the running executable.
fn default_engine_binary() -> PathBuf {
    let name = if cfg!(windows) { "sing-box.exe" } else { "sing-box" };
    let base = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_default();
    base.join("bin").join("sing-box").join(name)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> TunnelgateConfig {
        TunnelgateConfig {
            secret: "s3cret".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = TunnelgateConfig::default();
        assert_eq!(config.gateway_url, DEFAULT_GATEWAY_URL);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(7));
        assert_eq!(config.descriptor_scheme, "vless");
        assert!(config.engine_binary.ends_with("sing-box") || config.engine_binary.ends_with("sing-box.exe"));
    }

    #[test]
    fn test_validate_ok() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_missing_secret() {
        let config = TunnelgateConfig::default();
        assert!(matches!(config.validate(), Err(TunnelgateError::ConfigError(_))));
    }

    #[test]
    fn test_validate_missing_gateway() {
        let config = TunnelgateConfig {
            gateway_url: String::new(),
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(TunnelgateError::ConfigError(_))));
    }

    #[test]
    fn test_validate_bad_gateway_scheme() {
        let config = TunnelgateConfig {
            gateway_url: "ftp://gw.example.com".to_string(),
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(TunnelgateError::ConfigError(_))));
    }

    #[test]
    fn test_validate_zero_heartbeat() {
        let config = TunnelgateConfig {
            heartbeat_interval: Duration::ZERO,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_platform_tag_is_known() {
        let tag = platform_tag();
        assert!(!tag.is_empty());
        assert_ne!(tag, "darwin");
    }
}
