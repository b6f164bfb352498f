use hyper::StatusCode;
use thiserror::Error;

use super::context::ContextError;

/// Errors that can occur while brokering credentials
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("no role specified")]
    NoRoleSpecified,

    /// The caller's identity has no role mapping.
    #[error("empty role")]
    EmptyRole,

    #[error("unable to assume role {requested}, role permitted for caller is {permitted}")]
    Forbidden { requested: String, permitted: String },

    #[error("unable to resolve caller identity: {message}")]
    IdentityResolution { message: String },

    #[error("error finding role for {identity}: {source}")]
    Lookup {
        identity: String,
        #[source]
        source: Box<BrokerError>,
    },

    #[error("error fetching credentials for role {role}: {source}")]
    CredentialFetch {
        role: String,
        #[source]
        source: Box<BrokerError>,
    },

    #[error("error encoding credentials: {source}")]
    Encoding {
        #[from]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("sts error: {message}")]
    Sts { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl BrokerError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn forbidden(requested: impl Into<String>, permitted: impl Into<String>) -> Self {
        Self::Forbidden {
            requested: requested.into(),
            permitted: permitted.into(),
        }
    }

    pub fn identity(message: impl Into<String>) -> Self {
        Self::IdentityResolution {
            message: message.into(),
        }
    }

    pub fn lookup(identity: impl Into<String>, source: BrokerError) -> Self {
        Self::Lookup {
            identity: identity.into(),
            source: Box::new(source),
        }
    }

    pub fn credential_fetch(role: impl Into<String>, source: BrokerError) -> Self {
        Self::CredentialFetch {
            role: role.into(),
            source: Box::new(source),
        }
    }

    pub fn sts(message: impl Into<String>) -> Self {
        Self::Sts {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for the unmapped-identity sentinel, however deeply it was wrapped.
    pub fn is_empty_role(&self) -> bool {
        matches!(self, Self::EmptyRole)
    }

    /// True when the failure originates from request cancellation or deadline.
    pub fn is_context(&self) -> bool {
        match self {
            Self::Context(_) => true,
            Self::Lookup { source, .. } | Self::CredentialFetch { source, .. } => {
                source.is_context()
            }
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } | Self::NoRoleSpecified => StatusCode::BAD_REQUEST,
            Self::EmptyRole => StatusCode::NOT_FOUND,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::IdentityResolution { .. }
            | Self::Lookup { .. }
            | Self::CredentialFetch { .. }
            | Self::Encoding { .. }
            | Self::Context(_)
            | Self::Sts { .. }
            | Self::Config { .. }
            | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
