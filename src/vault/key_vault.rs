//! Key vault operations
//!
//! # Ownership
//!
//! [`KeyVault::apply`] only ever mutates records carrying the
//! `nauth.io/managed=true` marker. A record created by someone else at the
//! same name is an error, never silently taken over.
//!
//! # Legacy secrets
//!
//! Accounts created before the labeling scheme have their root and signing
//! seeds at fixed names (`<account>-ac-root`, `<account>-ac-sign`) with no
//! labels. When a label lookup does not yield both keys, the legacy names are
//! fetched concurrently and fill whatever is missing. Adopted records are
//! re-labeled so the next lookup takes the label path. Re-labeling is best
//! effort, so a half-labeled pair is still found.

use std::collections::BTreeMap;
use std::sync::Arc;

use nkeys::KeyPair;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{
    labels, Labels, SecretLocation, SecretRecord, SecretStore, SecretType, CREDS_KEY,
    LABEL_MANAGED, LABEL_SECRET_TYPE, MANAGED_VALUE, SEED_KEY,
};
use crate::keys::{self, Credentials};
use crate::spec::{OwnerRef, LABEL_ACCOUNT_ID};
use crate::types::{NauthError, Result};

/// Number of hex characters of the account id hash embedded in secret names
const NAME_HASH_LEN: usize = 6;

/// Root and signing keys of one account
pub struct AccountKeys {
    pub root: KeyPair,
    pub signing: KeyPair,
}

impl AccountKeys {
    pub fn account_id(&self) -> String {
        self.root.public_key()
    }
}

/// Secret name for new-style account key records.
///
/// The hash suffix keeps a re-created account (same name, new keys) from
/// colliding with records left behind by its predecessor.
pub fn account_secret_name(account_name: &str, account_id: &str, kind: SecretType) -> String {
    let digest = hex::encode(Sha256::digest(account_id.as_bytes()));
    format!(
        "{}-{}",
        legacy_account_secret_name(account_name, kind),
        &digest[..NAME_HASH_LEN]
    )
}

/// Fixed secret name used before account secrets were labeled
pub fn legacy_account_secret_name(account_name: &str, kind: SecretType) -> String {
    let suffix = match kind {
        SecretType::AccountSign => "ac-sign",
        _ => "ac-root",
    };
    format!("{account_name}-{suffix}")
}

/// Ownership-aware access to key material in a [`SecretStore`]
#[derive(Clone)]
pub struct KeyVault {
    store: Arc<dyn SecretStore>,
}

impl KeyVault {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    // =========================================================================
    // Record operations
    // =========================================================================

    /// Create or update a managed record.
    ///
    /// On create the owner reference and managed marker are attached. On
    /// update the existing record must carry the managed marker; labels are
    /// merged and the data replaced.
    pub async fn apply(
        &self,
        owner: Option<OwnerRef>,
        location: &SecretLocation,
        new_labels: Labels,
        data: BTreeMap<String, String>,
    ) -> Result<()> {
        match self.store.get(location).await {
            Ok(mut existing) => {
                if !existing.is_managed() {
                    return Err(NauthError::NotManaged {
                        namespace: location.namespace.clone(),
                        name: location.name.clone(),
                    });
                }
                existing.labels.extend(new_labels);
                existing.data = data;
                self.store
                    .update(existing)
                    .await
                    .map_err(|e| e.context(&format!("update secret {location}")))?;
                debug!(secret = %location, "Secret updated");
            }
            Err(e) if e.is_not_found() => {
                let mut record_labels = new_labels;
                record_labels.insert(LABEL_MANAGED.to_string(), MANAGED_VALUE.to_string());
                self.store
                    .create(SecretRecord {
                        namespace: location.namespace.clone(),
                        name: location.name.clone(),
                        labels: record_labels,
                        owner,
                        data,
                    })
                    .await
                    .map_err(|e| e.context(&format!("create secret {location}")))?;
                debug!(secret = %location, "Secret created");
            }
            Err(e) => return Err(e.context(&format!("read secret {location}"))),
        }
        Ok(())
    }

    pub async fn get(&self, location: &SecretLocation) -> Result<SecretRecord> {
        self.store.get(location).await
    }

    /// Records matching every selector label; empty when nothing matches
    pub async fn get_by_labels(&self, namespace: &str, selector: &Labels) -> Result<Vec<SecretRecord>> {
        self.store.list(namespace, selector).await
    }

    /// Delete a record; an absent record counts as deleted
    pub async fn delete(&self, location: &SecretLocation) -> Result<()> {
        match self.store.delete(location).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(secret = %location, "Secret already absent");
                Ok(())
            }
            Err(e) => Err(e.context(&format!("delete secret {location}"))),
        }
    }

    /// Delete every matching record; matching nothing is success
    pub async fn delete_by_labels(&self, namespace: &str, selector: &Labels) -> Result<usize> {
        let removed = self.store.delete_by_labels(namespace, selector).await?;
        debug!(namespace = %namespace, removed, "Secrets deleted by labels");
        Ok(removed)
    }

    /// Merge labels onto an existing record without touching its data
    pub async fn label(&self, location: &SecretLocation, extra: Labels) -> Result<()> {
        let mut record = self.store.get(location).await?;
        record.labels.extend(extra);
        self.store.update(record).await
    }

    // =========================================================================
    // Key material
    // =========================================================================

    /// The single operator signing key in `namespace`.
    ///
    /// Zero or several records labeled `operator-sign` is a configuration error.
    pub async fn operator_signing_key(&self, namespace: &str) -> Result<KeyPair> {
        let record = self
            .single_of_type(namespace, SecretType::OperatorSign)
            .await?;
        let seed = record.value(SEED_KEY).ok_or_else(|| {
            NauthError::Precondition(format!(
                "Operator signing secret {} has no '{SEED_KEY}' value",
                record.location()
            ))
        })?;
        keys::from_seed_with_prefix(seed, keys::OPERATOR_PREFIX)
            .map_err(|e| e.context(&format!("operator signing secret {}", record.location())))
    }

    /// Administrative (system account user) credentials used to reach the cluster
    pub async fn system_credentials(&self, namespace: &str) -> Result<Credentials> {
        let record = self
            .single_of_type(namespace, SecretType::SystemAccountUserCreds)
            .await?;
        let creds = record.value(CREDS_KEY).ok_or_else(|| {
            NauthError::Precondition(format!(
                "System credentials secret {} has no '{CREDS_KEY}' value",
                record.location()
            ))
        })?;
        keys::parse_credentials(creds)
            .map_err(|e| e.context(&format!("system credentials secret {}", record.location())))
    }

    async fn single_of_type(&self, namespace: &str, kind: SecretType) -> Result<SecretRecord> {
        let selector = labels([(LABEL_SECRET_TYPE, kind.as_str())]);
        let mut found = self.store.list(namespace, &selector).await?;
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(NauthError::Precondition(format!(
                "No secret labeled {LABEL_SECRET_TYPE}={} in namespace {namespace}",
                kind.as_str()
            ))),
            n => Err(NauthError::Precondition(format!(
                "Expected exactly one secret labeled {LABEL_SECRET_TYPE}={} in namespace {namespace}, found {n}",
                kind.as_str()
            ))),
        }
    }

    /// Persist freshly generated account keys as two labeled records
    pub async fn store_account_keys(
        &self,
        namespace: &str,
        account_name: &str,
        keys: &AccountKeys,
    ) -> Result<()> {
        let account_id = keys.account_id();
        for (kind, kp) in [
            (SecretType::AccountRoot, &keys.root),
            (SecretType::AccountSign, &keys.signing),
        ] {
            let location = SecretLocation::new(
                namespace,
                &account_secret_name(account_name, &account_id, kind),
            );
            let record_labels = labels([
                (LABEL_SECRET_TYPE, kind.as_str()),
                (LABEL_ACCOUNT_ID, account_id.as_str()),
            ]);
            let data = BTreeMap::from([(SEED_KEY.to_string(), keys::seed_of(kp)?)]);
            self.apply(None, &location, record_labels, data).await?;
        }
        Ok(())
    }

    /// Load an account's root and signing keys.
    ///
    /// Labeled records for `account_id` are preferred. Any key the label
    /// lookup does not produce (both of them when the id is not known) is
    /// taken from the legacy fixed names.
    pub async fn account_keys(
        &self,
        namespace: &str,
        account_name: &str,
        account_id: Option<&str>,
    ) -> Result<AccountKeys> {
        let labeled = match account_id {
            Some(id) => {
                let selector = labels([(LABEL_ACCOUNT_ID, id)]);
                self.store
                    .list(namespace, &selector)
                    .await?
                    .into_iter()
                    .filter(|r| {
                        matches!(
                            r.secret_type(),
                            Some(SecretType::AccountRoot | SecretType::AccountSign)
                        )
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        let (root, signing) = match split_account_records(account_name, labeled)? {
            (Some(root), Some(signing)) => (root, signing),
            (root, signing) => {
                debug!(
                    account = %account_name,
                    has_root = root.is_some(),
                    has_signing = signing.is_some(),
                    "Labeled account secrets incomplete, trying legacy names"
                );
                self.legacy_account_records(namespace, account_name, root, signing)
                    .await?
            }
        };

        let root_kp = decode_account_seed(&root)?;
        let signing_kp = decode_account_seed(&signing)?;
        Ok(AccountKeys {
            root: root_kp,
            signing: signing_kp,
        })
    }

    /// Complete a partial key set from the legacy names.
    ///
    /// Both legacy records are fetched in parallel. A legacy record only fills
    /// a slot the label lookup left empty, and every slot that stays empty is
    /// named in the error. Adopted legacy records are re-labeled.
    async fn legacy_account_records(
        &self,
        namespace: &str,
        account_name: &str,
        root: Option<SecretRecord>,
        signing: Option<SecretRecord>,
    ) -> Result<(SecretRecord, SecretRecord)> {
        let root_loc = SecretLocation::new(
            namespace,
            &legacy_account_secret_name(account_name, SecretType::AccountRoot),
        );
        let sign_loc = SecretLocation::new(
            namespace,
            &legacy_account_secret_name(account_name, SecretType::AccountSign),
        );

        let root_task = tokio::spawn({
            let store = Arc::clone(&self.store);
            let loc = root_loc.clone();
            async move { store.get(&loc).await }
        });
        let sign_task = tokio::spawn({
            let store = Arc::clone(&self.store);
            let loc = sign_loc.clone();
            async move { store.get(&loc).await }
        });
        let (legacy_root, legacy_sign) = tokio::join!(root_task, sign_task);
        let legacy_root = flatten_lookup(legacy_root, &root_loc);
        let legacy_sign = flatten_lookup(legacy_sign, &sign_loc);

        let mut failures = Vec::new();
        let mut adopted = Vec::new();
        let mut fill = |found: Option<SecretRecord>, legacy: Result<SecretRecord>, kind: SecretType| {
            match (found, legacy) {
                (Some(record), _) => Some(record),
                (None, Ok(record)) => {
                    adopted.push((record.location(), kind));
                    Some(record)
                }
                (None, Err(e)) => {
                    failures.push(e);
                    None
                }
            }
        };
        let root = fill(root, legacy_root, SecretType::AccountRoot);
        let signing = fill(signing, legacy_sign, SecretType::AccountSign);

        let (root, signing) = match (root, signing) {
            (Some(root), Some(signing)) => (root, signing),
            _ => return Err(legacy_lookup_error(account_name, failures)),
        };

        let account_id = root
            .value(SEED_KEY)
            .and_then(|seed| keys::from_seed(seed).ok())
            .map(|kp| kp.public_key());
        for (location, kind) in adopted {
            let mut extra = labels([
                (LABEL_SECRET_TYPE, kind.as_str()),
                (LABEL_MANAGED, MANAGED_VALUE),
            ]);
            if let Some(id) = &account_id {
                extra.insert(LABEL_ACCOUNT_ID.to_string(), id.clone());
            }
            if let Err(e) = self.label(&location, extra).await {
                warn!(secret = %location, error = %e, "Failed to label legacy secret");
            } else {
                info!(secret = %location, "Labeled legacy account secret");
            }
        }

        Ok((root, signing))
    }
}

/// Turn a joined lookup task into a plain result; a panic becomes an error
fn flatten_lookup(
    joined: std::result::Result<Result<SecretRecord>, tokio::task::JoinError>,
    location: &SecretLocation,
) -> Result<SecretRecord> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(NauthError::Internal(format!(
            "Lookup of secret {location} panicked"
        ))),
        Err(e) => Err(NauthError::Internal(format!(
            "Lookup of secret {location} was cancelled: {e}"
        ))),
    }
}

/// One error naming every legacy record that could not be loaded
fn legacy_lookup_error(account_name: &str, failures: Vec<NauthError>) -> NauthError {
    if failures.iter().all(NauthError::is_not_found) {
        let names: Vec<String> = failures
            .into_iter()
            .filter_map(|e| match e {
                NauthError::SecretNotFound { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        return NauthError::MissingSecrets {
            account: account_name.to_string(),
            detail: format!("not found: {}", names.join(", ")),
        };
    }
    let details: Vec<String> = failures.iter().map(ToString::to_string).collect();
    NauthError::Store(format!(
        "Legacy secret lookup for account {account_name} failed: {}",
        details.join("; ")
    ))
}

/// Partition labeled records into at most one root and one signing record
fn split_account_records(
    account_name: &str,
    records: Vec<SecretRecord>,
) -> Result<(Option<SecretRecord>, Option<SecretRecord>)> {
    let mut roots = Vec::new();
    let mut signs = Vec::new();
    for record in records {
        match record.secret_type() {
            Some(SecretType::AccountRoot) => roots.push(record),
            Some(SecretType::AccountSign) => signs.push(record),
            _ => {}
        }
    }

    if roots.len() > 1 || signs.len() > 1 {
        return Err(NauthError::Precondition(format!(
            "Account {account_name} has duplicate key secrets ({} root, {} signing)",
            roots.len(),
            signs.len()
        )));
    }
    Ok((roots.pop(), signs.pop()))
}

fn decode_account_seed(record: &SecretRecord) -> Result<KeyPair> {
    let seed = record.value(SEED_KEY).ok_or_else(|| {
        NauthError::Precondition(format!(
            "Secret {} has no '{SEED_KEY}' value",
            record.location()
        ))
    })?;
    keys::from_seed_with_prefix(seed, keys::ACCOUNT_PREFIX)
        .map_err(|e| e.context(&format!("secret {}", record.location())))
}
