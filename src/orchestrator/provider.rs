//! Account providers
//!
//! An [`AccountProvider`] is the backend that actually issues credentials for
//! an account and its users. Every backend offers the same six operations so
//! the reconcile rules stay backend-agnostic; [`ProviderRegistry`] picks the
//! backend from the account's `natsClusterRef`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::account::{AccountManager, AccountResult};
use crate::spec::{Account, User};
use crate::types::{NauthError, Result};
use crate::user::{UserManager, UserResult};

#[async_trait::async_trait]
pub trait AccountProvider: Send + Sync {
    async fn create_account(&self, account: &Account) -> Result<AccountResult>;

    async fn update_account(&self, account: &Account) -> Result<AccountResult>;

    async fn import_account(&self, account: &Account) -> Result<AccountResult>;

    async fn delete_account(&self, account: &Account) -> Result<()>;

    async fn create_or_update_user(&self, user: &User) -> Result<UserResult>;

    async fn delete_user(&self, user: &User) -> Result<()>;
}

/// Provider issuing credentials locally and publishing to a NATS cluster
pub struct LocalNatsProvider {
    accounts: AccountManager,
    users: UserManager,
}

impl LocalNatsProvider {
    pub fn new(accounts: AccountManager, users: UserManager) -> Self {
        Self { accounts, users }
    }

    pub fn accounts(&self) -> &AccountManager {
        &self.accounts
    }
}

#[async_trait::async_trait]
impl AccountProvider for LocalNatsProvider {
    async fn create_account(&self, account: &Account) -> Result<AccountResult> {
        self.accounts.create(account).await
    }

    async fn update_account(&self, account: &Account) -> Result<AccountResult> {
        self.accounts.update(account).await
    }

    async fn import_account(&self, account: &Account) -> Result<AccountResult> {
        self.accounts.import(account).await
    }

    async fn delete_account(&self, account: &Account) -> Result<()> {
        self.accounts.delete(account).await
    }

    async fn create_or_update_user(&self, user: &User) -> Result<UserResult> {
        self.users.create_or_update(user).await
    }

    async fn delete_user(&self, user: &User) -> Result<()> {
        self.users.delete(user).await
    }
}

/// Maps cluster references to providers
#[derive(Clone)]
pub struct ProviderRegistry {
    default: Arc<dyn AccountProvider>,
    clusters: HashMap<String, Arc<dyn AccountProvider>>,
}

impl ProviderRegistry {
    /// Registry where accounts without a cluster reference use `default`
    pub fn new(default: Arc<dyn AccountProvider>) -> Self {
        Self {
            default,
            clusters: HashMap::new(),
        }
    }

    /// Register the provider for cluster `namespace/name`
    pub fn register(&mut self, namespace: &str, name: &str, provider: Arc<dyn AccountProvider>) {
        self.clusters.insert(format!("{namespace}/{name}"), provider);
    }

    pub fn default_provider(&self) -> Arc<dyn AccountProvider> {
        self.default.clone()
    }

    pub fn provider_for(&self, account: &Account) -> Result<Arc<dyn AccountProvider>> {
        let Some(cluster) = &account.spec.nats_cluster_ref else {
            return Ok(self.default.clone());
        };
        let namespace = cluster
            .namespace
            .as_deref()
            .unwrap_or(&account.metadata.namespace);
        let key = format!("{namespace}/{}", cluster.name);
        self.clusters.get(&key).cloned().ok_or_else(|| {
            NauthError::Precondition(format!(
                "Account {} references unknown NATS cluster {key}",
                account.metadata.key()
            ))
        })
    }
}
