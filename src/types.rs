//! Error types for nauth
//!
//! Every failure carries enough context (operation, tenant) to be actionable
//! in logs. Seeds and credential bundles never appear in error messages.

use crate::claims::ClaimsError;

/// Main error type for credential lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum NauthError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required precondition does not hold (missing operator key, unresolved account, ...)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },

    #[error("Missing secret(s) for account {account}: {detail}")]
    MissingSecrets { account: String, detail: String },

    /// Refusal to mutate a secret this engine does not own
    #[error("Secret {namespace}/{name} is not managed by nauth")]
    NotManaged { namespace: String, name: String },

    #[error("Key mismatch for account {account}: expected {expected}, secret holds {actual}")]
    KeyMismatch {
        account: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Claims(#[from] ClaimsError),

    #[error("Key error: {0}")]
    Keys(String),

    #[error("Secret store error: {0}")]
    Store(String),

    #[error("NATS error: {0}")]
    Nats(String),

    #[error("NATS connection not established")]
    NotConnected,

    #[error("Cluster rejected request (code {code}): {message}")]
    ClusterRejected { code: i64, message: String },

    #[error("Account {account} still has {users} user(s); refusing to delete")]
    DeleteGuard { account: String, users: usize },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NauthError {
    /// True when the error signals an absent record rather than an I/O failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SecretNotFound { .. })
    }

    /// Prefix the message with the failing operation, keeping the variant
    pub fn context(self, what: &str) -> Self {
        match self {
            Self::Config(m) => Self::Config(format!("{what}: {m}")),
            Self::Precondition(m) => Self::Precondition(format!("{what}: {m}")),
            Self::Keys(m) => Self::Keys(format!("{what}: {m}")),
            Self::Store(m) => Self::Store(format!("{what}: {m}")),
            Self::Nats(m) => Self::Nats(format!("{what}: {m}")),
            Self::Internal(m) => Self::Internal(format!("{what}: {m}")),
            other => other,
        }
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for NauthError {
    fn from(err: std::io::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<serde_json::Error> for NauthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for NauthError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(format!("YAML error: {}", err))
    }
}

impl From<async_nats::Error> for NauthError {
    fn from(err: async_nats::Error) -> Self {
        Self::Nats(err.to_string())
    }
}

impl From<nkeys::error::Error> for NauthError {
    fn from(err: nkeys::error::Error) -> Self {
        Self::Keys(err.to_string())
    }
}

/// Result type alias for nauth operations
pub type Result<T> = std::result::Result<T, NauthError>;
