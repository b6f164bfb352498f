use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::server::error::{BrokerError, BrokerResult};

// AssumeRole accepts DurationSeconds in this range.
const SESSION_DURATION_RANGE: std::ops::RangeInclusive<u64> = 900..=43_200;

// Leaves room for the "-xxxxxxxx" suffix within STS's 64 character limit.
const MAX_SESSION_NAME_PREFIX: usize = 55;

/// Configuration for the credential broker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// STS role assumption configuration
    pub sts: StsConfig,

    /// Caller identity to permitted role
    pub roles: HashMap<String, String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port for the metadata API
    pub port: u16,

    /// Port for health checks and metrics
    pub health_port: u16,

    /// Per-request deadline in seconds
    pub request_timeout: u64,

    /// Take the caller address from a single-hop X-Forwarded-For header
    pub trust_forwarded_for: bool,
}

/// STS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StsConfig {
    /// AWS region for STS calls
    pub region: String,

    /// Prefix turning bare role names into ARNs, e.g. `arn:aws:iam::123456789012:role/`
    pub role_base_arn: Option<String>,

    /// Prefix of the role session name
    pub session_name: String,

    /// Lifetime of assumed-role sessions in seconds
    pub session_duration: u64,

    /// Refresh credentials expiring within this many seconds
    pub refresh_window: u64,

    /// Seconds between background refresh sweeps
    pub refresh_interval: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Whether to log in JSON format
    pub json_format: bool,
}

impl BrokerConfig {
    pub fn from_yaml(contents: &str) -> BrokerResult<Self> {
        let config: Self = serde_yaml::from_str(contents)
            .map_err(|e| BrokerError::config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> BrokerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BrokerError::config(format!("unable to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    /// Reject settings the server cannot run with. Called again after
    /// command-line overrides are applied.
    pub(crate) fn validate(&self) -> BrokerResult<()> {
        if !SESSION_DURATION_RANGE.contains(&self.sts.session_duration) {
            return Err(BrokerError::config(format!(
                "sts.session_duration ({}s) must be between {} and {} seconds",
                self.sts.session_duration,
                SESSION_DURATION_RANGE.start(),
                SESSION_DURATION_RANGE.end()
            )));
        }
        if self.sts.refresh_window >= self.sts.session_duration {
            return Err(BrokerError::config(format!(
                "sts.refresh_window ({}s) must be shorter than sts.session_duration ({}s)",
                self.sts.refresh_window, self.sts.session_duration
            )));
        }
        if self.sts.refresh_interval == 0 {
            return Err(BrokerError::config("sts.refresh_interval must be positive"));
        }
        validate_session_name(&self.sts.session_name)?;
        if self.server.request_timeout == 0 {
            return Err(BrokerError::config("server.request_timeout must be positive"));
        }
        if let Some((identity, _)) = self.roles.iter().find(|(_, role)| role.is_empty()) {
            return Err(BrokerError::config(format!(
                "role for {} is empty; remove the entry instead",
                identity
            )));
        }
        Ok(())
    }
}

/// Session names may only use STS's `[\w+=,.@-]` characters.
fn validate_session_name(name: &str) -> BrokerResult<()> {
    if name.is_empty() || name.len() > MAX_SESSION_NAME_PREFIX {
        return Err(BrokerError::config(format!(
            "sts.session_name must be 1 to {} characters",
            MAX_SESSION_NAME_PREFIX
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "_+=,.@-".contains(*c)))
    {
        return Err(BrokerError::config(format!(
            "sts.session_name contains invalid character {:?}",
            c
        )));
    }
    Ok(())
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl StsConfig {
    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_duration)
    }

    pub fn refresh_window(&self) -> Duration {
        Duration::from_secs(self.refresh_window)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            health_port: default_health_port(),
            request_timeout: default_request_timeout(),
            trust_forwarded_for: false,
        }
    }
}

impl Default for StsConfig {
    fn default() -> Self {
        Self {
            region: default_aws_region(),
            role_base_arn: None,
            session_name: default_session_name(),
            session_duration: default_session_duration(),
            refresh_window: default_refresh_window(),
            refresh_interval: default_refresh_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

// Default value functions
fn default_port() -> u16 {
    8181
}
fn default_health_port() -> u16 {
    8182
}
fn default_request_timeout() -> u64 {
    5
}
fn default_aws_region() -> String {
    "us-east-1".to_string()
}
fn default_session_name() -> String {
    "role-broker".to_string()
}
fn default_session_duration() -> u64 {
    900
}
fn default_refresh_window() -> u64 {
    300
}
fn default_refresh_interval() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = BrokerConfig::from_yaml("{}").unwrap();
        assert_eq!(config.server.port, 8181);
        assert_eq!(config.server.health_port, 8182);
        assert_eq!(config.server.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.sts.region, "us-east-1");
        assert_eq!(config.logging.level, "info");
        assert!(config.roles.is_empty());
    }

    #[test]
    fn test_full_document() {
        let config = BrokerConfig::from_yaml(
            r#"
server:
  port: 9000
  trust_forwarded_for: true
sts:
  region: eu-west-1
  role_base_arn: "arn:aws:iam::123456789012:role/"
  session_duration: 3600
roles:
  10.0.0.5: billing-reader
logging:
  json_format: true
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.health_port, 8182);
        assert!(config.server.trust_forwarded_for);
        assert_eq!(config.sts.region, "eu-west-1");
        assert_eq!(
            config.sts.role_base_arn.as_deref(),
            Some("arn:aws:iam::123456789012:role/")
        );
        assert_eq!(config.sts.session_duration(), Duration::from_secs(3600));
        assert_eq!(config.roles["10.0.0.5"], "billing-reader");
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_refresh_window_must_fit_session() {
        let err = BrokerConfig::from_yaml("sts: { session_duration: 900, refresh_window: 900 }")
            .unwrap_err();
        assert!(err.to_string().contains("refresh_window"));
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let err = BrokerConfig::from_yaml("sts: { refresh_interval: 0 }").unwrap_err();
        assert!(err.to_string().contains("refresh_interval"));
    }

    #[test]
    fn test_session_duration_must_be_assumable() {
        for duration in [60u64, 50_000, 4_294_967_296] {
            let yaml = format!("sts: {{ session_duration: {}, refresh_window: 30 }}", duration);
            let err = BrokerConfig::from_yaml(&yaml).unwrap_err();
            assert!(err.to_string().contains("session_duration"), "{}", duration);
        }
        let config = BrokerConfig::from_yaml("sts: { session_duration: 43200 }").unwrap();
        assert_eq!(config.sts.session_duration(), Duration::from_secs(43_200));
    }

    #[test]
    fn test_session_name_charset() {
        let long = format!("sts: {{ session_name: {} }}", "a".repeat(56));
        for yaml in [
            "sts: { session_name: 'brokér' }",
            "sts: { session_name: 'role broker' }",
            "sts: { session_name: '' }",
            long.as_str(),
        ] {
            let err = BrokerConfig::from_yaml(yaml).unwrap_err();
            assert!(err.to_string().contains("session_name"), "{}", yaml);
        }

        let config =
            BrokerConfig::from_yaml("sts: { session_name: 'ops_role+1=a,b.c@d-e' }").unwrap();
        assert_eq!(config.sts.session_name, "ops_role+1=a,b.c@d-e");
    }

    #[test]
    fn test_empty_role_mapping_rejected() {
        let err = BrokerConfig::from_yaml("roles: { 10.0.0.5: '' }").unwrap_err();
        assert!(matches!(err, BrokerError::Config { .. }));
    }
}
