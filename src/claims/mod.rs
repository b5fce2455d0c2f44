//! Claims building
//!
//! Turns declarative account/user specs into signed NATS JWTs as an explicit
//! pipeline:
//!
//! ```text
//! spec ──resolve imports──> ResolvedImports ──build──> AccountClaims ──sign──> JWT
//!                              (async, collects                (pure, validates,
//!                               every failure)                  fails as a whole)
//! ```
//!
//! A build never returns a partially valid document: every issue found
//! (unresolved import, conflicting import subject, bad connection constraint)
//! is reported at once in a single [`ClaimsError::Invalid`].

pub mod account;
pub mod jwt;
pub mod nats;
pub mod user;

pub use account::{
    build_account_claims, decode_account_jwt, resolve_imports, validate_imports, AccountClaims,
    ImportResolver, ResolvedImports,
};
pub use user::{build_user_claims, UserClaims};

/// A single validation problem found while building claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimsIssue {
    /// The account an import points at could not be resolved to a public id
    UnresolvedImport {
        import: String,
        account: String,
        reason: String,
    },
    /// Two or more imports land on the same local subject
    ConflictingImportSubject { subject: String },
    /// A user source network is not a valid CIDR
    InvalidSource { cidr: String },
    /// A user connection window is not `HH:MM:SS`-`HH:MM:SS`
    InvalidTimeRange { start: String, end: String },
}

impl std::fmt::Display for ClaimsIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimsIssue::UnresolvedImport {
                import,
                account,
                reason,
            } => write!(
                f,
                "import {import:?} references unresolved account {account}: {reason}"
            ),
            ClaimsIssue::ConflictingImportSubject { subject } => {
                write!(f, "conflicting import subject {subject:?}")
            }
            ClaimsIssue::InvalidSource { cidr } => write!(f, "invalid source network {cidr:?}"),
            ClaimsIssue::InvalidTimeRange { start, end } => {
                write!(f, "invalid time range {start:?}-{end:?}")
            }
        }
    }
}

/// Errors from building, signing or decoding claims
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimsError {
    #[error("invalid claims: {}", join_issues(.0))]
    Invalid(Vec<ClaimsIssue>),

    #[error("failed to encode claims: {0}")]
    Encoding(String),

    #[error("failed to decode claims: {0}")]
    Decoding(String),
}

impl ClaimsError {
    /// The individual validation issues, empty for encoding/decoding failures
    pub fn issues(&self) -> &[ClaimsIssue] {
        match self {
            ClaimsError::Invalid(issues) => issues,
            _ => &[],
        }
    }
}

fn join_issues(issues: &[ClaimsIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_error_lists_every_issue() {
        let err = ClaimsError::Invalid(vec![
            ClaimsIssue::ConflictingImportSubject {
                subject: "a.>".into(),
            },
            ClaimsIssue::InvalidSource {
                cidr: "nope".into(),
            },
        ]);

        let msg = err.to_string();
        assert!(msg.contains("conflicting import subject \"a.>\""));
        assert!(msg.contains("invalid source network \"nope\""));
        assert_eq!(err.issues().len(), 2);
    }
}
