//! NATS JWT v2 claim bodies
//!
//! Field names follow the NATS JWT v2 JSON encoding so the server accepts
//! the documents as-is. Durations are nanoseconds, as the server expects.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Value the server reads as "no limit"
pub const NO_LIMIT: i64 = -1;

/// Claims version understood by the server
pub const CLAIMS_VERSION: u8 = 2;

/// Registered claims wrapping a NATS body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtClaims<T> {
    #[serde(default)]
    pub jti: String,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub iss: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    pub nats: T,
}

// =============================================================================
// Account
// =============================================================================

/// Account limits as the server sees them: transport, account and JetStream
/// limits flattened into one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorLimits {
    pub subs: i64,
    pub data: i64,
    pub payload: i64,
    pub imports: i64,
    pub exports: i64,
    pub wildcards: bool,
    pub conn: i64,
    pub leaf: i64,
    #[serde(default = "no_limit")]
    pub mem_storage: i64,
    #[serde(default = "no_limit")]
    pub disk_storage: i64,
    #[serde(default = "no_limit")]
    pub streams: i64,
    #[serde(default = "no_limit")]
    pub consumer: i64,
    #[serde(default = "no_limit")]
    pub max_ack_pending: i64,
    #[serde(default = "no_limit")]
    pub mem_max_stream_bytes: i64,
    #[serde(default = "no_limit")]
    pub disk_max_stream_bytes: i64,
    #[serde(default)]
    pub max_bytes_required: bool,
}

fn no_limit() -> i64 {
    NO_LIMIT
}

impl Default for OperatorLimits {
    fn default() -> Self {
        Self {
            subs: NO_LIMIT,
            data: NO_LIMIT,
            payload: NO_LIMIT,
            imports: NO_LIMIT,
            exports: NO_LIMIT,
            wildcards: true,
            conn: NO_LIMIT,
            leaf: NO_LIMIT,
            mem_storage: NO_LIMIT,
            disk_storage: NO_LIMIT,
            streams: NO_LIMIT,
            consumer: NO_LIMIT,
            max_ack_pending: NO_LIMIT,
            mem_max_stream_bytes: NO_LIMIT,
            disk_max_stream_bytes: NO_LIMIT,
            max_bytes_required: false,
        }
    }
}

/// Latency sampling rate; 0 is encoded as `"headers"` (header-triggered tracing)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sampling(pub i64);

impl Serialize for Sampling {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if self.0 == 0 {
            s.serialize_str("headers")
        } else {
            s.serialize_i64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Sampling {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }
        match Raw::deserialize(d)? {
            Raw::Number(n) => Ok(Sampling(n)),
            Raw::Text(t) if t.eq_ignore_ascii_case("headers") => Ok(Sampling(0)),
            Raw::Text(t) => t
                .trim_end_matches('%')
                .parse()
                .map(Sampling)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsServiceLatency {
    pub sampling: Sampling,
    pub results: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsExport {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub subject: String,
    #[serde(rename = "type")]
    pub export_type: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub token_req: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub revocations: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    /// Nanoseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_threshold: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_latency: Option<NatsServiceLatency>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub account_token_position: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub advertise: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_trace: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsImport {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub subject: String,
    pub account: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local_subject: String,
    #[serde(rename = "type")]
    pub import_type: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub share: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_trace: bool,
}

impl NatsImport {
    pub fn effective_subject(&self) -> &str {
        if self.local_subject.is_empty() {
            &self.subject
        } else {
            &self.local_subject
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsPermission {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsPermissions {
    #[serde(default, rename = "pub")]
    pub publish: NatsPermission,
    #[serde(default, rename = "sub")]
    pub subscribe: NatsPermission,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resp: Option<NatsResponsePermission>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsResponsePermission {
    pub max: i64,
    /// Nanoseconds
    #[serde(default)]
    pub ttl: i64,
}

/// `nats` body of an account JWT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsAccount {
    pub limits: OperatorLimits,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<NatsExport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<NatsImport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signing_keys: Vec<String>,
    #[serde(default)]
    pub default_permissions: NatsPermissions,
    #[serde(rename = "type")]
    pub claim_type: String,
    pub version: u8,
}

// =============================================================================
// User
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsTimeRange {
    pub start: String,
    pub end: String,
}

/// `nats` body of a user JWT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsUser {
    #[serde(default, rename = "pub")]
    pub publish: NatsPermission,
    #[serde(default, rename = "sub")]
    pub subscribe: NatsPermission,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resp: Option<NatsResponsePermission>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub times: Vec<NatsTimeRange>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub times_location: String,
    pub subs: i64,
    pub data: i64,
    pub payload: i64,
    /// Account public id when the issuer is one of its signing keys
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issuer_account: String,
    #[serde(rename = "type")]
    pub claim_type: String,
    pub version: u8,
}

// =============================================================================
// Generic
// =============================================================================

/// `nats` body of the operator-signed claim that asks the resolver to delete accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsAccountDeletion {
    pub accounts: Vec<String>,
    #[serde(rename = "type")]
    pub claim_type: String,
    pub version: u8,
}

impl NatsAccountDeletion {
    pub fn new(accounts: Vec<String>) -> Self {
        Self {
            accounts,
            claim_type: "generic".to_string(),
            version: CLAIMS_VERSION,
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}
