use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sts::config::Region;
use aws_sdk_sts::error::DisplayErrorContext;
use aws_sdk_sts::Client as StsClient;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::credentials::RoleAssumer;
use super::error::{BrokerError, BrokerResult};
use crate::common::config::StsConfig;
use crate::common::Credentials;

// STS caps role session names at 64 characters.
const MAX_SESSION_NAME: usize = 64;

/// Assumes roles through AWS STS
pub struct StsRoleAssumer {
    client: StsClient,
    role_base_arn: Option<String>,
    session_name: String,
    session_duration: Duration,
}

impl StsRoleAssumer {
    pub fn new(client: StsClient, config: &StsConfig) -> Self {
        Self {
            client,
            role_base_arn: config.role_base_arn.clone(),
            session_name: config.session_name.clone(),
            session_duration: config.session_duration(),
        }
    }

    pub async fn from_config(config: &StsConfig) -> Self {
        let aws_cfg = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        info!("STS client configured for region {}", config.region);
        Self::new(StsClient::new(&aws_cfg), config)
    }

    fn role_arn(&self, role: &str) -> String {
        role_arn(self.role_base_arn.as_deref(), role)
    }

    fn session_name(&self) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        let suffix = &suffix[..8];
        let prefix: String = self
            .session_name
            .chars()
            .take(MAX_SESSION_NAME - suffix.len() - 1)
            .collect();
        format!("{}-{}", prefix, suffix)
    }

    fn duration_seconds(&self) -> BrokerResult<i32> {
        i32::try_from(self.session_duration.as_secs()).map_err(|_| {
            BrokerError::sts(format!(
                "session duration {}s is out of range",
                self.session_duration.as_secs()
            ))
        })
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    #[instrument(skip(self))]
    async fn assume_role(&self, role: &str) -> BrokerResult<Credentials> {
        let arn = self.role_arn(role);
        let session_name = self.session_name();
        let duration_seconds = self.duration_seconds()?;
        debug!("Calling AssumeRole for {} as {}", arn, session_name);

        let output = self
            .client
            .assume_role()
            .role_arn(&arn)
            .role_session_name(session_name)
            .duration_seconds(duration_seconds)
            .send()
            .await
            .map_err(|e| {
                error!("AssumeRole failed for {}: {}", arn, DisplayErrorContext(&e));
                BrokerError::sts(format!(
                    "assume role {} failed: {}",
                    arn,
                    DisplayErrorContext(&e)
                ))
            })?;

        let creds = output
            .credentials()
            .ok_or_else(|| BrokerError::sts(format!("no credentials returned for {}", arn)))?;

        let expiration = creds.expiration();
        let expiration = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
            .ok_or_else(|| BrokerError::sts(format!("invalid expiration for {}", arn)))?;

        Ok(Credentials::new(
            creds.access_key_id(),
            creds.secret_access_key(),
            creds.session_token(),
            expiration,
        ))
    }
}

/// Qualifies a bare role name with the configured ARN prefix.
pub fn role_arn(base: Option<&str>, role: &str) -> String {
    if role.starts_with("arn:") {
        return role.to_string();
    }
    match base {
        Some(base) if base.ends_with('/') => format!("{}{}", base, role),
        Some(base) => format!("{}/{}", base, role),
        None => role.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_arn() {
        let base = Some("arn:aws:iam::123456789012:role/");
        assert_eq!(
            role_arn(base, "billing-reader"),
            "arn:aws:iam::123456789012:role/billing-reader"
        );
        assert_eq!(
            role_arn(Some("arn:aws:iam::123456789012:role"), "billing-reader"),
            "arn:aws:iam::123456789012:role/billing-reader"
        );
        assert_eq!(
            role_arn(base, "arn:aws:iam::999999999999:role/other"),
            "arn:aws:iam::999999999999:role/other"
        );
        assert_eq!(role_arn(None, "billing-reader"), "billing-reader");
    }

    #[tokio::test]
    async fn test_session_name_is_bounded() {
        let aws_cfg = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .load()
            .await;
        let config = StsConfig {
            session_name: "x".repeat(100),
            ..StsConfig::default()
        };
        let assumer = StsRoleAssumer::new(StsClient::new(&aws_cfg), &config);

        assert_eq!(assumer.session_name().len(), MAX_SESSION_NAME);

        let assumer = StsRoleAssumer::new(StsClient::new(&aws_cfg), &StsConfig::default());
        let name = assumer.session_name();
        assert!(name.starts_with("role-broker-"));
        assert_ne!(name, assumer.session_name());

        let config = StsConfig {
            session_name: "é".repeat(40),
            ..StsConfig::default()
        };
        let assumer = StsRoleAssumer::new(StsClient::new(&aws_cfg), &config);
        assert!(assumer.session_name().starts_with(&"é".repeat(40)));
    }

    #[tokio::test]
    async fn test_oversized_session_duration_is_an_error() {
        let aws_cfg = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .load()
            .await;
        let config = StsConfig {
            session_duration: u64::from(u32::MAX) + 1,
            ..StsConfig::default()
        };
        let assumer = StsRoleAssumer::new(StsClient::new(&aws_cfg), &config);
        assert!(matches!(assumer.duration_seconds(), Err(BrokerError::Sts { .. })));

        let assumer = StsRoleAssumer::new(StsClient::new(&aws_cfg), &StsConfig::default());
        assert_eq!(assumer.duration_seconds().unwrap(), 900);
    }
}
