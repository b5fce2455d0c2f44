//! Key vault
//!
//! Private key seeds and credential bundles live as records in a namespaced,
//! label-queryable secret store. [`SecretStore`] is the storage substrate
//! (in-memory or file-backed here; any Kubernetes-style secret API fits);
//! [`KeyVault`] layers ownership enforcement, key decoding and the legacy
//! secret migration path on top of it.
//!
//! ## Labels
//!
//! | Label | Values |
//! |-------|--------|
//! | `nauth.io/secret-type` | `account-root`, `account-sign`, `operator-sign`, `user-credentials`, `system-account-user-creds` |
//! | `nauth.io/managed` | `true` on every record this engine created |
//! | `account.nauth.io/id` | owning account public id |

pub mod file;
pub mod key_vault;
pub mod memory;

pub use file::FileSecretStore;
pub use key_vault::{account_secret_name, legacy_account_secret_name, AccountKeys, KeyVault};
pub use memory::MemorySecretStore;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::spec::OwnerRef;
use crate::types::Result;

/// Label selecting the role of a secret
pub const LABEL_SECRET_TYPE: &str = "nauth.io/secret-type";

/// Marker label: the record is owned and mutable by this engine
pub const LABEL_MANAGED: &str = "nauth.io/managed";

/// Value of [`LABEL_MANAGED`]
pub const MANAGED_VALUE: &str = "true";

/// Key under which seeds are stored
pub const SEED_KEY: &str = "default";

/// Key under which `.creds` bundles are stored
pub const CREDS_KEY: &str = "user.creds";

pub type Labels = BTreeMap<String, String>;

/// Role of a secret record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretType {
    AccountRoot,
    AccountSign,
    OperatorSign,
    UserCredentials,
    SystemAccountUserCreds,
}

impl SecretType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretType::AccountRoot => "account-root",
            SecretType::AccountSign => "account-sign",
            SecretType::OperatorSign => "operator-sign",
            SecretType::UserCredentials => "user-credentials",
            SecretType::SystemAccountUserCreds => "system-account-user-creds",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "account-root" => Some(SecretType::AccountRoot),
            "account-sign" => Some(SecretType::AccountSign),
            "operator-sign" => Some(SecretType::OperatorSign),
            "user-credentials" => Some(SecretType::UserCredentials),
            "system-account-user-creds" => Some(SecretType::SystemAccountUserCreds),
            _ => None,
        }
    }
}

/// Exact address of a secret record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretLocation {
    pub namespace: String,
    pub name: String,
}

impl SecretLocation {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for SecretLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A stored secret: labels, optional owner and opaque values
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    /// Resource whose deletion garbage-collects this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerRef>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl SecretRecord {
    pub fn location(&self) -> SecretLocation {
        SecretLocation::new(&self.namespace, &self.name)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn secret_type(&self) -> Option<SecretType> {
        self.labels
            .get(LABEL_SECRET_TYPE)
            .and_then(|t| SecretType::parse(t))
    }

    pub fn is_managed(&self) -> bool {
        self.labels.get(LABEL_MANAGED).map(String::as_str) == Some(MANAGED_VALUE)
    }

    /// True when every selector pair is present on the record
    pub fn matches(&self, selector: &Labels) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k) == Some(v))
    }
}

impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("labels", &self.labels)
            .field("owner", &self.owner)
            .field("data", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Build a label map from pairs
pub fn labels<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Namespaced, label-queryable secret storage
///
/// Not-found on exact reads and deletes is reported as
/// [`NauthError::SecretNotFound`](crate::types::NauthError::SecretNotFound);
/// label queries that match nothing return an empty list.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, location: &SecretLocation) -> Result<SecretRecord>;

    async fn list(&self, namespace: &str, selector: &Labels) -> Result<Vec<SecretRecord>>;

    /// Fails if a record already exists at the location
    async fn create(&self, record: SecretRecord) -> Result<()>;

    /// Fails if no record exists at the location
    async fn update(&self, record: SecretRecord) -> Result<()>;

    async fn delete(&self, location: &SecretLocation) -> Result<()>;

    /// Delete every matching record, returning how many were removed
    async fn delete_by_labels(&self, namespace: &str, selector: &Labels) -> Result<usize>;
}
