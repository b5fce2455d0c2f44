//! Account resource

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ResourceMeta;

/// Desired-state account resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub metadata: ResourceMeta,
    #[serde(default)]
    pub spec: AccountSpec,
    #[serde(default)]
    pub status: AccountStatus,
}

impl Account {
    pub fn new(namespace: &str, name: &str, spec: AccountSpec) -> Self {
        Self {
            metadata: ResourceMeta::new(namespace, name),
            spec,
            status: AccountStatus::default(),
        }
    }

    /// Resolved public id, if the account has been created or imported
    pub fn account_id(&self) -> Option<&str> {
        self.metadata.label(super::LABEL_ACCOUNT_ID)
    }

    pub fn is_observe_only(&self) -> bool {
        self.metadata.label(super::LABEL_MANAGEMENT_POLICY) == Some(super::MANAGEMENT_POLICY_OBSERVE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_limits: Option<AccountLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nats_limits: Option<NatsLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jet_stream_limits: Option<JetStreamLimits>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<Export>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Import>,
    /// Cluster backend owning this account; the default provider when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nats_cluster_ref: Option<NatsClusterRef>,
}

/// Account-level limits. Unset fields mean "unlimited".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imports: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exports: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wildcard_exports: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf: Option<i64>,
}

/// Transport limits shared by accounts and users
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatsLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subs: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JetStreamLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_storage: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_storage: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streams: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ack_pending: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_max_stream_bytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_max_stream_bytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes_required: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportType {
    #[default]
    Stream,
    Service,
}

/// Response semantics of a service export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    #[default]
    Singleton,
    Stream,
    Chunked,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLatency {
    /// Sampling percentage (1-100); 0 means headers-triggered
    pub sampling: i64,
    /// Subject latency results are published to
    pub results: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Export {
    #[serde(default)]
    pub name: String,
    pub subject: String,
    #[serde(default, rename = "type")]
    pub export_type: ExportType,
    #[serde(default)]
    pub token_req: bool,
    /// Revoked public keys, with the unix time revocation applies from
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub revocations: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    #[serde(
        default,
        with = "super::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_threshold: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_latency: Option<ServiceLatency>,
    #[serde(default)]
    pub account_token_position: u32,
    #[serde(default)]
    pub advertise: bool,
    #[serde(default)]
    pub allow_trace: bool,
}

/// Reference to another account resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRef {
    pub name: String,
    /// Defaults to the importing account's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Import {
    /// Exporting account, resolved to its public id at build time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_ref: Option<AccountRef>,
    /// Exporting account's public id, when known directly (observed claims)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default)]
    pub name: String,
    pub subject: String,
    /// Local rename of the imported subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_subject: Option<String>,
    #[serde(default, rename = "type")]
    pub import_type: ExportType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub share: bool,
    #[serde(default)]
    pub allow_trace: bool,
}

impl Import {
    /// Subject the import is visible under inside the importing account
    pub fn effective_subject(&self) -> &str {
        self.local_subject
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.subject)
    }
}

/// Which cluster backend owns an account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatsClusterRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Resolved claims as reported on the account status: every limit filled in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountClaimsView {
    pub account_limits: AccountLimits,
    pub nats_limits: NatsLimits,
    pub jet_stream_limits: JetStreamLimits,
    #[serde(default)]
    pub exports: Vec<Export>,
    #[serde(default)]
    pub imports: Vec<Import>,
    #[serde(default)]
    pub signing_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<AccountClaimsView>,
    /// Public key of the account's signing keypair
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled_at: Option<DateTime<Utc>>,
}
