//! Control-plane subjects and reply payloads
//!
//! The cluster answers claims updates and deletions with a small JSON
//! envelope: `data` on success, `error` on rejection. Lookups reply with the
//! raw JWT (empty when the account is unknown).

use serde::{Deserialize, Serialize};

use crate::types::{NauthError, Result};

/// Subject for publishing account claims
pub const CLAIMS_UPDATE_SUBJECT: &str = "$SYS.REQ.CLAIMS.UPDATE";

/// Subject for revoking account claims
pub const CLAIMS_DELETE_SUBJECT: &str = "$SYS.REQ.CLAIMS.DELETE";

/// Status code the cluster reports on success
pub const SUCCESS_CODE: i64 = 200;

/// Subject for looking up the published claims of one account
pub fn claims_lookup_subject(account_id: &str) -> String {
    format!("$SYS.REQ.ACCOUNT.{account_id}.CLAIMS.LOOKUP")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerApiData {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerApiError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub description: String,
}

/// Reply to a claims update or delete request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerApiResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ServerApiData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServerApiError>,
}

impl ServerApiResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| NauthError::Nats(format!("Malformed control-plane reply: {e}")))
    }

    /// Succeed only when the reply carries the success code
    pub fn into_result(self) -> Result<ServerApiData> {
        if let Some(err) = self.error {
            return Err(NauthError::ClusterRejected {
                code: err.code,
                message: err.description,
            });
        }
        match self.data {
            Some(data) if data.code == SUCCESS_CODE => Ok(data),
            Some(data) => Err(NauthError::ClusterRejected {
                code: data.code,
                message: data.message,
            }),
            None => Err(NauthError::ClusterRejected {
                code: 0,
                message: "empty reply".to_string(),
            }),
        }
    }
}
