//! Account and user directory
//!
//! The orchestrator's view of desired-state resources: finding a user's
//! account, counting an account's users for the deletion guard, and
//! resolving cross-account import references.

use dashmap::DashMap;

use crate::claims::ImportResolver;
use crate::spec::{Account, User};
use crate::types::{NauthError, Result};

/// Lookup of desired-state resources by `namespace/name`.
///
/// Every directory also resolves account ids, strictly for issuance and
/// leniently where a not-yet-issued account is acceptable.
#[async_trait::async_trait]
pub trait AccountDirectory: ImportResolver {
    async fn account(&self, namespace: &str, name: &str) -> Result<Account>;

    /// Users in `namespace` issued under account `name`
    async fn users_of_account(&self, namespace: &str, name: &str) -> Result<Vec<User>>;
}

/// Directory held in memory, refreshed by the caller as resources change
#[derive(Default)]
pub struct InMemoryDirectory {
    accounts: DashMap<String, Account>,
    users: DashMap<String, User>,
}

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_account(&self, account: Account) {
        self.accounts.insert(account.metadata.key(), account);
    }

    pub fn put_user(&self, user: User) {
        self.users.insert(user.metadata.key(), user);
    }

    pub fn remove_account(&self, namespace: &str, name: &str) {
        self.accounts.remove(&key(namespace, name));
    }

    pub fn remove_user(&self, namespace: &str, name: &str) {
        self.users.remove(&key(namespace, name));
    }
}

#[async_trait::async_trait]
impl AccountDirectory for InMemoryDirectory {
    async fn account(&self, namespace: &str, name: &str) -> Result<Account> {
        self.accounts
            .get(&key(namespace, name))
            .map(|a| a.value().clone())
            .ok_or_else(|| {
                NauthError::Precondition(format!("Account {namespace}/{name} not found"))
            })
    }

    async fn users_of_account(&self, namespace: &str, name: &str) -> Result<Vec<User>> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.metadata.namespace == namespace && u.spec.account_name == name)
            .map(|u| u.value().clone())
            .collect())
    }
}

#[async_trait::async_trait]
impl ImportResolver for InMemoryDirectory {
    async fn resolve_account_id_lenient(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>> {
        let account = self.account(namespace, name).await?;
        Ok(account.account_id().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{AccountSpec, UserSpec, LABEL_ACCOUNT_ID};

    fn user(ns: &str, name: &str, account: &str) -> User {
        User::new(
            ns,
            name,
            UserSpec {
                account_name: account.into(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_users_of_account_scoped_by_namespace() {
        let dir = InMemoryDirectory::new();
        dir.put_user(user("tenants", "a", "shop"));
        dir.put_user(user("tenants", "b", "shop"));
        dir.put_user(user("tenants", "c", "billing"));
        dir.put_user(user("other", "d", "shop"));

        assert_eq!(dir.users_of_account("tenants", "shop").await.unwrap().len(), 2);
        dir.remove_user("tenants", "a");
        assert_eq!(dir.users_of_account("tenants", "shop").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolver_requires_issued_id() {
        let dir = InMemoryDirectory::new();
        let mut account = Account::new("tenants", "shop", AccountSpec::default());
        dir.put_account(account.clone());

        let err = dir.resolve_account_id("tenants", "shop").await.unwrap_err();
        assert!(err.to_string().contains("not ready"));

        account.metadata.set_label(LABEL_ACCOUNT_ID, "AEXAMPLE");
        dir.put_account(account);
        assert_eq!(
            dir.resolve_account_id("tenants", "shop").await.unwrap(),
            "AEXAMPLE"
        );
        assert!(dir.resolve_account_id("tenants", "missing").await.is_err());
    }

    #[tokio::test]
    async fn test_lenient_resolution_tolerates_unissued_account() {
        let dir = InMemoryDirectory::new();
        let mut account = Account::new("tenants", "shop", AccountSpec::default());
        dir.put_account(account.clone());

        assert_eq!(
            dir.resolve_account_id_lenient("tenants", "shop").await.unwrap(),
            None
        );

        account.metadata.set_label(LABEL_ACCOUNT_ID, "AEXAMPLE");
        dir.put_account(account);
        assert_eq!(
            dir.resolve_account_id_lenient("tenants", "shop").await.unwrap(),
            Some("AEXAMPLE".to_string())
        );

        // unknown accounts fail in both modes
        let err = dir
            .resolve_account_id_lenient("tenants", "missing")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
