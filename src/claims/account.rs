//! Account claims
//!
//! Limits start fully unlimited and each configured field overlays its
//! default individually, so setting `conn` alone leaves every other limit at
//! `-1`. Imports are resolved against their exporting accounts first, then
//! checked for local-subject collisions; any issue fails the whole build.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use nkeys::KeyPair;
use tracing::debug;

use super::nats::{
    JwtClaims, NatsAccount, NatsExport, NatsImport, NatsPermissions, NatsServiceLatency,
    OperatorLimits, Sampling, CLAIMS_VERSION,
};
use super::{jwt, ClaimsError, ClaimsIssue};
use crate::keys;
use crate::spec::{
    AccountClaimsView, AccountLimits, AccountSpec, Export, ExportType, Import, JetStreamLimits,
    NatsLimits, ResponseType, ServiceLatency,
};

/// Resolves the account an import points at to its public id
#[async_trait::async_trait]
pub trait ImportResolver: Send + Sync {
    /// Public id of account `namespace/name`, `None` while the account exists
    /// without one. Fails only when the account is unknown.
    async fn resolve_account_id_lenient(
        &self,
        namespace: &str,
        name: &str,
    ) -> crate::Result<Option<String>>;

    /// Public id of account `namespace/name`.
    ///
    /// Fails when the account is unknown or has not been issued an id yet.
    async fn resolve_account_id(&self, namespace: &str, name: &str) -> crate::Result<String> {
        self.resolve_account_id_lenient(namespace, name)
            .await?
            .ok_or_else(|| {
                crate::NauthError::Precondition(format!("Account {namespace}/{name} is not ready"))
            })
    }
}

/// Imports translated to their wire form, plus every resolution failure
#[derive(Debug, Clone, Default)]
pub struct ResolvedImports {
    pub imports: Vec<NatsImport>,
    pub issues: Vec<ClaimsIssue>,
}

/// Immutable account claims ready to be signed by an operator key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountClaims {
    /// Human-readable account name
    pub name: String,
    /// Account public id
    pub subject: String,
    /// Issuer, only known for claims decoded from a published JWT
    pub issuer: Option<String>,
    pub nats: NatsAccount,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Resolve every import's exporting account.
///
/// Never short-circuits: a failed resolution is recorded and the import is
/// left out, so the caller sees every broken reference in one pass.
pub async fn resolve_imports(
    namespace: &str,
    imports: &[Import],
    resolver: &dyn ImportResolver,
) -> ResolvedImports {
    let mut resolved = ResolvedImports::default();

    for import in imports {
        let label = import_label(import);
        let account_id = match (&import.account_ref, &import.account) {
            (Some(account_ref), _) => {
                let ns = account_ref.namespace.as_deref().unwrap_or(namespace);
                match resolver.resolve_account_id(ns, &account_ref.name).await {
                    Ok(id) => id,
                    Err(e) => {
                        resolved.issues.push(ClaimsIssue::UnresolvedImport {
                            import: label,
                            account: format!("{ns}/{}", account_ref.name),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                }
            }
            (None, Some(id)) if keys::is_public_key(id, keys::ACCOUNT_PREFIX) => id.clone(),
            (None, other) => {
                resolved.issues.push(ClaimsIssue::UnresolvedImport {
                    import: label,
                    account: other.clone().unwrap_or_else(|| "<none>".to_string()),
                    reason: "no accountRef and no valid account id".to_string(),
                });
                continue;
            }
        };

        resolved.imports.push(NatsImport {
            name: import.name.clone(),
            subject: import.subject.clone(),
            account: account_id,
            token: import.token.clone().unwrap_or_default(),
            local_subject: import.local_subject.clone().unwrap_or_default(),
            import_type: export_type_name(import.import_type).to_string(),
            share: import.share,
            allow_trace: import.allow_trace,
        });
    }

    resolved
}

/// Reject import sets where two imports share an effective local subject.
///
/// On any collision the whole set is dropped: the returned imports are
/// empty and one issue is reported per conflicting subject.
pub fn validate_imports(imports: Vec<NatsImport>) -> (Vec<NatsImport>, Vec<ClaimsIssue>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for import in &imports {
        *seen.entry(import.effective_subject()).or_default() += 1;
    }

    let conflicts: BTreeSet<String> = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(subject, _)| subject.to_string())
        .collect();

    if conflicts.is_empty() {
        return (imports, Vec::new());
    }

    let issues = conflicts
        .into_iter()
        .map(|subject| ClaimsIssue::ConflictingImportSubject { subject })
        .collect();
    (Vec::new(), issues)
}

/// Build account claims from a spec and its already-resolved imports.
///
/// `signing_keys` are the account signing public keys authorized to issue users.
pub fn build_account_claims(
    name: &str,
    account_id: &str,
    spec: &AccountSpec,
    resolved: ResolvedImports,
    signing_keys: &[String],
) -> Result<AccountClaims, ClaimsError> {
    let limits = merge_limits(spec);
    let exports = spec.exports.iter().map(export_claim).collect();

    let (imports, conflicts) = validate_imports(resolved.imports);
    let mut issues = resolved.issues;
    issues.extend(conflicts);
    if !issues.is_empty() {
        debug!(account = %name, issues = issues.len(), "Account claims rejected");
        return Err(ClaimsError::Invalid(issues));
    }

    Ok(AccountClaims {
        name: name.to_string(),
        subject: account_id.to_string(),
        issuer: None,
        nats: NatsAccount {
            limits,
            exports,
            imports,
            signing_keys: signing_keys.to_vec(),
            default_permissions: NatsPermissions::default(),
            claim_type: "account".to_string(),
            version: CLAIMS_VERSION,
        },
    })
}

/// Decode a published account JWT, verifying its signature
pub fn decode_account_jwt(token: &str) -> Result<AccountClaims, ClaimsError> {
    let claims: JwtClaims<NatsAccount> = jwt::decode(token)?;
    if claims.nats.claim_type != "account" {
        return Err(ClaimsError::Decoding(format!(
            "expected account claims, got {:?}",
            claims.nats.claim_type
        )));
    }
    Ok(AccountClaims {
        name: claims.name,
        subject: claims.sub,
        issuer: Some(claims.iss),
        nats: claims.nats,
    })
}

impl AccountClaims {
    /// Encode and sign with the operator signing key
    pub fn sign(&self, operator: &KeyPair) -> Result<String, ClaimsError> {
        jwt::encode(
            JwtClaims {
                jti: String::new(),
                iat: 0,
                iss: String::new(),
                name: self.name.clone(),
                sub: self.subject.clone(),
                exp: None,
                nats: self.nats.clone(),
            },
            operator,
        )
    }

    /// Translate back into the declarative shape used for status reporting
    pub fn view(&self) -> AccountClaimsView {
        let l = &self.nats.limits;
        AccountClaimsView {
            account_limits: AccountLimits {
                imports: Some(l.imports),
                exports: Some(l.exports),
                wildcard_exports: Some(l.wildcards),
                conn: Some(l.conn),
                leaf: Some(l.leaf),
            },
            nats_limits: NatsLimits {
                subs: Some(l.subs),
                data: Some(l.data),
                payload: Some(l.payload),
            },
            jet_stream_limits: JetStreamLimits {
                mem_storage: Some(l.mem_storage),
                disk_storage: Some(l.disk_storage),
                streams: Some(l.streams),
                consumer: Some(l.consumer),
                max_ack_pending: Some(l.max_ack_pending),
                mem_max_stream_bytes: Some(l.mem_max_stream_bytes),
                disk_max_stream_bytes: Some(l.disk_max_stream_bytes),
                max_bytes_required: Some(l.max_bytes_required),
            },
            exports: self.nats.exports.iter().map(export_view).collect(),
            imports: self.nats.imports.iter().map(import_view).collect(),
            signing_keys: self.nats.signing_keys.clone(),
        }
    }
}

// =============================================================================
// Translation helpers
// =============================================================================

fn merge_limits(spec: &AccountSpec) -> OperatorLimits {
    let mut limits = OperatorLimits::default();

    if let Some(a) = &spec.account_limits {
        overlay(&mut limits.imports, a.imports);
        overlay(&mut limits.exports, a.exports);
        overlay(&mut limits.wildcards, a.wildcard_exports);
        overlay(&mut limits.conn, a.conn);
        overlay(&mut limits.leaf, a.leaf);
    }
    if let Some(n) = &spec.nats_limits {
        overlay(&mut limits.subs, n.subs);
        overlay(&mut limits.data, n.data);
        overlay(&mut limits.payload, n.payload);
    }
    if let Some(js) = &spec.jet_stream_limits {
        overlay(&mut limits.mem_storage, js.mem_storage);
        overlay(&mut limits.disk_storage, js.disk_storage);
        overlay(&mut limits.streams, js.streams);
        overlay(&mut limits.consumer, js.consumer);
        overlay(&mut limits.max_ack_pending, js.max_ack_pending);
        overlay(&mut limits.mem_max_stream_bytes, js.mem_max_stream_bytes);
        overlay(&mut limits.disk_max_stream_bytes, js.disk_max_stream_bytes);
        overlay(&mut limits.max_bytes_required, js.max_bytes_required);
    }

    limits
}

pub(crate) fn overlay<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn export_claim(export: &Export) -> NatsExport {
    NatsExport {
        name: export.name.clone(),
        subject: export.subject.clone(),
        export_type: export_type_name(export.export_type).to_string(),
        token_req: export.token_req,
        revocations: export.revocations.clone(),
        response_type: export.response_type.map(|r| response_type_name(r).to_string()),
        response_threshold: export
            .response_threshold
            .map(|d| d.as_nanos().min(i64::MAX as u128) as i64),
        service_latency: export.service_latency.as_ref().map(|l| NatsServiceLatency {
            sampling: Sampling(l.sampling),
            results: l.results.clone(),
        }),
        account_token_position: export.account_token_position,
        advertise: export.advertise,
        allow_trace: export.allow_trace,
    }
}

fn export_view(export: &NatsExport) -> Export {
    Export {
        name: export.name.clone(),
        subject: export.subject.clone(),
        export_type: parse_export_type(&export.export_type),
        token_req: export.token_req,
        revocations: export.revocations.clone(),
        response_type: export.response_type.as_deref().map(parse_response_type),
        response_threshold: export
            .response_threshold
            .map(|ns| Duration::from_nanos(ns.max(0) as u64)),
        service_latency: export.service_latency.as_ref().map(|l| ServiceLatency {
            sampling: l.sampling.0,
            results: l.results.clone(),
        }),
        account_token_position: export.account_token_position,
        advertise: export.advertise,
        allow_trace: export.allow_trace,
    }
}

fn import_view(import: &NatsImport) -> Import {
    Import {
        account_ref: None,
        account: Some(import.account.clone()),
        name: import.name.clone(),
        subject: import.subject.clone(),
        local_subject: Some(import.local_subject.clone()).filter(|s| !s.is_empty()),
        import_type: parse_export_type(&import.import_type),
        token: Some(import.token.clone()).filter(|s| !s.is_empty()),
        share: import.share,
        allow_trace: import.allow_trace,
    }
}

fn import_label(import: &Import) -> String {
    if import.name.is_empty() {
        import.subject.clone()
    } else {
        import.name.clone()
    }
}

fn export_type_name(t: ExportType) -> &'static str {
    match t {
        ExportType::Stream => "stream",
        ExportType::Service => "service",
    }
}

fn parse_export_type(s: &str) -> ExportType {
    if s.eq_ignore_ascii_case("service") {
        ExportType::Service
    } else {
        ExportType::Stream
    }
}

fn response_type_name(r: ResponseType) -> &'static str {
    match r {
        ResponseType::Singleton => "Singleton",
        ResponseType::Stream => "Stream",
        ResponseType::Chunked => "Chunked",
    }
}

fn parse_response_type(s: &str) -> ResponseType {
    match s {
        "Stream" => ResponseType::Stream,
        "Chunked" => ResponseType::Chunked,
        _ => ResponseType::Singleton,
    }
}
