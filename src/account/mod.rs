//! Account credential manager
//!
//! Per-account lifecycle: `Absent -> Created -> Published`, plus an
//! observe-only `Imported` branch that never creates key material.
//!
//! | Operation | Key material | Cluster |
//! |-----------|--------------|---------|
//! | [`create`](AccountManager::create) | generates root + signing, stores both | publishes claims |
//! | [`update`](AccountManager::update) | reads existing (legacy fallback) | publishes claims |
//! | [`import`](AccountManager::import) | reads existing, checks root id | looks up published claims |
//! | [`delete`](AccountManager::delete) | deletes every record of the account | revokes claims |
//!
//! Operator keys and the system credentials used to reach the cluster live
//! in the operator namespace; account keys live in the account's namespace.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::claims::nats::{JwtClaims, NatsAccountDeletion};
use crate::claims::{self, build_account_claims, resolve_imports, AccountClaims, ImportResolver};
use crate::keys;
use crate::nats::ClusterControl;
use crate::spec::{Account, AccountClaimsView, LABEL_ACCOUNT_ID};
use crate::types::{NauthError, Result};
use crate::vault::{labels, AccountKeys, KeyVault};

/// Outcome of a successful account operation, for status reporting
#[derive(Debug, Clone, PartialEq)]
pub struct AccountResult {
    /// Account public id
    pub account_id: String,
    /// Public key of the operator key that signed (or, on import, issued) the claims
    pub signer_id: String,
    /// Account signing public key
    pub signing_key: String,
    pub claims: AccountClaimsView,
}

pub struct AccountManager {
    vault: KeyVault,
    cluster: Arc<dyn ClusterControl>,
    resolver: Arc<dyn ImportResolver>,
    operator_namespace: String,
}

impl AccountManager {
    pub fn new(
        vault: KeyVault,
        cluster: Arc<dyn ClusterControl>,
        resolver: Arc<dyn ImportResolver>,
        operator_namespace: &str,
    ) -> Self {
        Self {
            vault,
            cluster,
            resolver,
            operator_namespace: operator_namespace.to_string(),
        }
    }

    /// Mint keys for a new account, store them and publish its claims.
    ///
    /// Claims are built and validated before anything is stored, so an
    /// account with unresolved imports leaves no key material behind. Always
    /// generates fresh keys. A retry after a failed publish stores a second
    /// key pair under different (hash-suffixed) names.
    pub async fn create(&self, account: &Account) -> Result<AccountResult> {
        let name = &account.metadata.name;
        let namespace = &account.metadata.namespace;
        let operator = self.vault.operator_signing_key(&self.operator_namespace).await?;

        let keys = AccountKeys {
            root: keys::generate_account_key(),
            signing: keys::generate_account_key(),
        };
        let account_id = keys.account_id();
        debug!(account = %name, account_id = %account_id, "Generated account keys");

        let claims = self.build(account, &account_id, &keys).await?;

        self.vault
            .store_account_keys(namespace, name, &keys)
            .await
            .map_err(|e| e.context(&format!("store keys for account {name}")))?;

        let jwt = claims.sign(&operator)?;
        self.publish(&jwt).await?;

        info!(account = %name, account_id = %account_id, "Account created");
        Ok(result(&claims, &operator, &keys))
    }

    /// Re-sign and publish claims for an existing account; keys are never regenerated
    pub async fn update(&self, account: &Account) -> Result<AccountResult> {
        let name = &account.metadata.name;
        let operator = self.vault.operator_signing_key(&self.operator_namespace).await?;
        let keys = self.existing_keys(account).await?;
        let account_id = keys.account_id();

        let claims = self.build(account, &account_id, &keys).await?;
        let jwt = claims.sign(&operator)?;
        self.publish(&jwt).await?;

        info!(account = %name, account_id = %account_id, "Account updated");
        Ok(result(&claims, &operator, &keys))
    }

    /// Report the published claims of an account managed elsewhere
    pub async fn import(&self, account: &Account) -> Result<AccountResult> {
        let name = &account.metadata.name;
        let keys = self.existing_keys(account).await?;
        let account_id = keys.account_id();

        let claims = self.lookup(&account_id).await?.ok_or_else(|| {
            NauthError::Precondition(format!(
                "Account {name} ({account_id}) has no claims published on the cluster"
            ))
        })?;
        if claims.subject != account_id {
            return Err(NauthError::KeyMismatch {
                account: name.clone(),
                expected: account_id,
                actual: claims.subject,
            });
        }

        info!(account = %name, account_id = %account_id, "Account imported");
        Ok(AccountResult {
            signer_id: claims.issuer.clone().unwrap_or_default(),
            signing_key: keys.signing.public_key(),
            claims: claims.view(),
            account_id,
        })
    }

    /// Revoke the account on the cluster and remove its key material.
    ///
    /// Secret cleanup is best effort once the revocation went through.
    pub async fn delete(&self, account: &Account) -> Result<()> {
        let name = &account.metadata.name;
        let Some(account_id) = account.account_id() else {
            debug!(account = %name, "Account never issued, nothing to revoke");
            return Ok(());
        };
        let operator = self.vault.operator_signing_key(&self.operator_namespace).await?;

        let deletion = JwtClaims {
            jti: String::new(),
            iat: 0,
            iss: String::new(),
            name: String::new(),
            sub: operator.public_key(),
            exp: None,
            nats: NatsAccountDeletion::new(vec![account_id.to_string()]),
        };
        let jwt = claims::jwt::encode(deletion, &operator)?;

        self.connected(self.cluster.delete_claims(&jwt))
            .await
            .map_err(|e| e.context(&format!("revoke account {name}")))?;

        let selector = labels([(LABEL_ACCOUNT_ID, account_id)]);
        if let Err(e) = self
            .vault
            .delete_by_labels(&account.metadata.namespace, &selector)
            .await
        {
            warn!(account = %name, account_id = %account_id, error = %e, "Failed to remove account secrets");
        }

        info!(account = %name, account_id = %account_id, "Account deleted");
        Ok(())
    }

    /// Currently published claims for `account_id`, `None` when the cluster has none
    pub async fn lookup(&self, account_id: &str) -> Result<Option<AccountClaims>> {
        let jwt = self.connected(self.cluster.lookup_claims(account_id)).await?;
        if jwt.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(claims::decode_account_jwt(jwt.trim())?))
    }

    /// Load stored keys and check they belong to the id recorded on the account
    async fn existing_keys(&self, account: &Account) -> Result<AccountKeys> {
        let name = &account.metadata.name;
        let expected = account.account_id().ok_or_else(|| {
            NauthError::Precondition(format!("Account {name} has no resolved id"))
        })?;
        let keys = self
            .vault
            .account_keys(&account.metadata.namespace, name, Some(expected))
            .await?;

        let actual = keys.account_id();
        if actual != expected {
            return Err(NauthError::KeyMismatch {
                account: name.clone(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(keys)
    }

    async fn build(
        &self,
        account: &Account,
        account_id: &str,
        keys: &AccountKeys,
    ) -> Result<AccountClaims> {
        let resolved = resolve_imports(
            &account.metadata.namespace,
            &account.spec.imports,
            self.resolver.as_ref(),
        )
        .await;
        let claims = build_account_claims(
            &account.metadata.name,
            account_id,
            &account.spec,
            resolved,
            &[keys.signing.public_key()],
        )?;
        Ok(claims)
    }

    async fn publish(&self, jwt: &str) -> Result<()> {
        self.connected(self.cluster.upload_claims(jwt)).await
    }

    /// Run `request` on a fresh cluster connection.
    ///
    /// The connection is released afterwards whether connecting, the request
    /// or neither failed.
    async fn connected<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        let outcome = match self.cluster.ensure_connected(&self.operator_namespace).await {
            Ok(()) => request.await,
            Err(e) => Err(e),
        };
        self.cluster.disconnect().await;
        outcome
    }
}

fn result(claims: &AccountClaims, operator: &nkeys::KeyPair, keys: &AccountKeys) -> AccountResult {
    AccountResult {
        account_id: claims.subject.clone(),
        signer_id: operator.public_key(),
        signing_key: keys.signing.public_key(),
        claims: claims.view(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{AccountLimits, AccountSpec};
    use crate::testing::{vault_with_operator, RecordingCluster, StaticResolver, OPERATOR_NAMESPACE};
    use crate::vault::{SecretStore, LABEL_SECRET_TYPE};

    async fn manager() -> (
        Arc<crate::vault::MemorySecretStore>,
        Arc<RecordingCluster>,
        AccountManager,
    ) {
        let (store, vault, _operator) = vault_with_operator().await;
        let cluster = Arc::new(RecordingCluster::default());
        let manager = AccountManager::new(
            vault,
            cluster.clone(),
            Arc::new(StaticResolver::default()),
            OPERATOR_NAMESPACE,
        );
        (store, cluster, manager)
    }

    #[tokio::test]
    async fn test_create_then_update_keeps_keys() {
        let (store, cluster, manager) = manager().await;
        let mut account = Account::new("tenants", "shop", AccountSpec::default());

        let created = manager.create(&account).await.unwrap();
        account
            .metadata
            .set_label(LABEL_ACCOUNT_ID, created.account_id.clone());

        account.spec.account_limits = Some(AccountLimits {
            conn: Some(25),
            ..Default::default()
        });
        let updated = manager.update(&account).await.unwrap();

        assert_eq!(updated.account_id, created.account_id);
        assert_eq!(updated.signing_key, created.signing_key);
        assert_eq!(updated.claims.account_limits.conn, Some(25));
        assert_eq!(cluster.upload_count(), 2);
        assert_eq!(
            store
                .list("tenants", &labels([(LABEL_ACCOUNT_ID, created.account_id.as_str())]))
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            cluster.connects.load(std::sync::atomic::Ordering::SeqCst),
            cluster.disconnects.load(std::sync::atomic::Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_update_without_id_is_precondition() {
        let (_store, _cluster, manager) = manager().await;
        let account = Account::new("tenants", "shop", AccountSpec::default());
        assert!(matches!(
            manager.update(&account).await,
            Err(NauthError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn test_import_detects_root_key_mismatch() {
        let (store, _cluster, manager) = manager().await;
        let created = manager
            .create(&Account::new("tenants", "shop", AccountSpec::default()))
            .await
            .unwrap();

        // relabel the root secret so the label lookup finds a foreign key
        let mut root = store
            .list(
                "tenants",
                &labels([(LABEL_SECRET_TYPE, "account-root")]),
            )
            .await
            .unwrap()
            .remove(0);
        let foreign = keys::generate_account_key();
        root.data
            .insert(crate::vault::SEED_KEY.into(), keys::seed_of(&foreign).unwrap());
        store.update(root).await.unwrap();

        let mut observed = Account::new("tenants", "shop", AccountSpec::default());
        observed
            .metadata
            .set_label(LABEL_ACCOUNT_ID, created.account_id.clone());
        let err = manager.import(&observed).await.unwrap_err();
        assert!(matches!(err, NauthError::KeyMismatch { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_create_surfaces_cluster_rejection() {
        let (_store, vault, _operator) = vault_with_operator().await;
        let cluster = Arc::new(RecordingCluster {
            reject_uploads: true,
            ..Default::default()
        });
        let manager = AccountManager::new(
            vault,
            cluster.clone(),
            Arc::new(StaticResolver::default()),
            OPERATOR_NAMESPACE,
        );

        let err = manager
            .create(&Account::new("tenants", "shop", AccountSpec::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, NauthError::ClusterRejected { code: 500, .. }));
        assert_eq!(cluster.disconnects.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_with_unresolved_imports_stores_nothing() {
        let (store, cluster, manager) = manager().await;
        let account = Account::new(
            "tenants",
            "shop",
            AccountSpec {
                imports: vec![crate::spec::Import {
                    account_ref: Some(crate::spec::AccountRef {
                        name: "billing".into(),
                        namespace: None,
                    }),
                    name: "invoices".into(),
                    subject: "invoices.>".into(),
                    ..Default::default()
                }],
                ..Default::default()
            },
        );

        for _ in 0..3 {
            let err = manager.create(&account).await.unwrap_err();
            assert!(matches!(err, NauthError::Claims(_)), "{err}");
        }
        assert!(store
            .list("tenants", &crate::vault::Labels::new())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(cluster.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_connect_still_releases_connection() {
        let (_store, vault, _operator) = vault_with_operator().await;
        let cluster = Arc::new(RecordingCluster {
            fail_connect: true,
            ..Default::default()
        });
        let manager = AccountManager::new(
            vault,
            cluster.clone(),
            Arc::new(StaticResolver::default()),
            OPERATOR_NAMESPACE,
        );

        let mut account = Account::new("tenants", "shop", AccountSpec::default());
        assert!(manager.create(&account).await.is_err());
        assert!(manager.lookup("ANOBODY").await.is_err());
        account
            .metadata
            .set_label(LABEL_ACCOUNT_ID, keys::generate_account_key().public_key());
        assert!(manager.delete(&account).await.is_err());

        assert_eq!(cluster.connects.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(cluster.disconnects.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(cluster.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_of_unissued_account_is_noop() {
        let (_store, cluster, manager) = manager().await;
        manager
            .delete(&Account::new("tenants", "draft", AccountSpec::default()))
            .await
            .unwrap();
        assert_eq!(cluster.delete_count(), 0);
    }
}
