use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

pub const CREDENTIALS_CODE_SUCCESS: &str = "Success";
pub const CREDENTIALS_TYPE_HMAC: &str = "AWS-HMAC";

/// Temporary credentials in the shape served by the EC2 instance metadata API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    pub code: String,
    #[serde(serialize_with = "rfc3339_seconds")]
    pub last_updated: DateTime<Utc>,
    #[serde(rename = "Type")]
    pub credential_type: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub token: String,
    #[serde(serialize_with = "rfc3339_seconds")]
    pub expiration: DateTime<Utc>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        token: impl Into<String>,
        expiration: DateTime<Utc>,
    ) -> Self {
        Self {
            code: CREDENTIALS_CODE_SUCCESS.to_string(),
            last_updated: Utc::now(),
            credential_type: CREDENTIALS_TYPE_HMAC.to_string(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            token: token.into(),
            expiration,
        }
    }

    /// Whether these credentials stay valid for longer than `window` past `now`.
    pub fn valid_for(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.expiration - now > window
    }
}

fn rfc3339_seconds<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
}
