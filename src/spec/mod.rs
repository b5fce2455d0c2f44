//! Declarative tenant resources
//!
//! The desired-state shapes the orchestration layer hands to the engine:
//! an [`Account`] (exports, imports, limits) and a [`User`] (permissions,
//! limits, connection constraints), each with Kubernetes-style metadata.
//!
//! ## Resource labels
//!
//! The engine writes resolved identities back onto resources as labels so
//! later reconciles (and other resources) can find them:
//!
//! - `account.nauth.io/id` - the account's public id
//! - `account.nauth.io/signed-by` - operator signing key that issued the account
//! - `user.nauth.io/id`, `user.nauth.io/account-id`, `user.nauth.io/signed-by`

pub mod account;
pub mod duration;
pub mod user;

pub use account::{
    Account, AccountClaimsView, AccountLimits, AccountRef, AccountSpec, AccountStatus, Export,
    ExportType, Import, JetStreamLimits, NatsClusterRef, NatsLimits, ResponseType,
    ServiceLatency,
};
pub use user::{
    Permission, Permissions, ResponsePermission, TimeRange, User, UserClaimsView, UserLimits,
    UserSpec, UserStatus,
};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label carrying an account's resolved public id
pub const LABEL_ACCOUNT_ID: &str = "account.nauth.io/id";

/// Label carrying the operator signing key that issued an account
pub const LABEL_ACCOUNT_SIGNED_BY: &str = "account.nauth.io/signed-by";

/// Label carrying a user's public id
pub const LABEL_USER_ID: &str = "user.nauth.io/id";

/// Label carrying the id of the account a user belongs to
pub const LABEL_USER_ACCOUNT_ID: &str = "user.nauth.io/account-id";

/// Label carrying the account signing key that issued a user
pub const LABEL_USER_SIGNED_BY: &str = "user.nauth.io/signed-by";

/// Label selecting the management policy of a resource
pub const LABEL_MANAGEMENT_POLICY: &str = "nauth.io/management-policy";

/// Management policy value for observe-only (imported) accounts
pub const MANAGEMENT_POLICY_OBSERVE: &str = "observe";

/// Resource metadata shared by accounts and users
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Stable identity used for owner references
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Set when the resource has been marked for deletion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ResourceMeta {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            uid: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn set_label(&mut self, key: &str, value: impl Into<String>) {
        self.labels.insert(key.to_string(), value.into());
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// `namespace/name`, for log fields and error messages
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Owner reference attached to secrets created on behalf of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
    pub uid: String,
}

impl OwnerRef {
    pub fn user(meta: &ResourceMeta) -> Self {
        Self {
            kind: "User".to_string(),
            name: meta.name.clone(),
            uid: meta.uid.clone(),
        }
    }
}
