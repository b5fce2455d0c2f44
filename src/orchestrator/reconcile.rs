//! Reconcile rules
//!
//! Decides which provider operation a resource needs, enforces the
//! account deletion guard, bounds each operation with a deadline and
//! records the outcome on the resource's labels and status.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use super::directory::AccountDirectory;
use super::provider::ProviderRegistry;
use crate::spec::{
    Account, User, LABEL_ACCOUNT_ID, LABEL_ACCOUNT_SIGNED_BY, LABEL_USER_ACCOUNT_ID,
    LABEL_USER_ID, LABEL_USER_SIGNED_BY,
};
use crate::types::{NauthError, Result};

/// Default deadline for one reconcile operation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountAction {
    Create,
    Update,
    Import,
    Delete,
    /// Stop tracking an observe-only account without touching the cluster or its secrets
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    CreateOrUpdate,
    Delete,
}

/// Operation an account needs: deletion wins, then observe-only, then id presence.
///
/// A deleted observe-only account is released, never revoked.
pub fn plan_account(account: &Account) -> AccountAction {
    if account.metadata.is_deleting() {
        if account.is_observe_only() {
            AccountAction::Release
        } else {
            AccountAction::Delete
        }
    } else if account.is_observe_only() {
        AccountAction::Import
    } else if account.account_id().is_some() {
        AccountAction::Update
    } else {
        AccountAction::Create
    }
}

pub fn plan_user(user: &User) -> UserAction {
    if user.metadata.is_deleting() {
        UserAction::Delete
    } else {
        UserAction::CreateOrUpdate
    }
}

pub struct Reconciler {
    providers: ProviderRegistry,
    directory: Arc<dyn AccountDirectory>,
    timeout: Duration,
}

impl Reconciler {
    pub fn new(providers: ProviderRegistry, directory: Arc<dyn AccountDirectory>) -> Self {
        Self {
            providers,
            directory,
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bring one account to its desired state, updating labels and status.
    ///
    /// Failures are recorded on the status and returned.
    pub async fn reconcile_account(&self, account: &mut Account) -> Result<AccountAction> {
        let action = plan_account(account);
        let key = account.metadata.key();
        debug!(account = %key, action = ?action, "Reconciling account");

        match self.apply_account(action, account).await {
            Ok(()) => {
                info!(account = %key, action = ?action, "Account reconciled");
                Ok(action)
            }
            Err(e) => {
                error!(account = %key, action = ?action, error = %e, "Account reconcile failed");
                account.status.ready = false;
                account.status.message = Some(e.to_string());
                account.status.reconciled_at = Some(Utc::now());
                Err(e)
            }
        }
    }

    async fn apply_account(&self, action: AccountAction, account: &mut Account) -> Result<()> {
        let key = account.metadata.key();
        if action == AccountAction::Release {
            info!(account = %key, "Releasing observe-only account, cluster and secrets left as is");
            return Ok(());
        }
        let provider = self.providers.provider_for(account)?;

        let outcome = match action {
            AccountAction::Delete => {
                self.guard_delete(account).await?;
                self.bounded(&key, provider.delete_account(account)).await?;
                return Ok(());
            }
            AccountAction::Create => self.bounded(&key, provider.create_account(account)).await?,
            AccountAction::Update => self.bounded(&key, provider.update_account(account)).await?,
            AccountAction::Import => self.bounded(&key, provider.import_account(account)).await?,
            AccountAction::Release => return Ok(()),
        };

        account
            .metadata
            .set_label(LABEL_ACCOUNT_ID, outcome.account_id.clone());
        account
            .metadata
            .set_label(LABEL_ACCOUNT_SIGNED_BY, outcome.signer_id.clone());
        account.status.claims = Some(outcome.claims);
        account.status.signing_key = Some(outcome.signing_key);
        account.status.ready = true;
        account.status.message = None;
        account.status.reconciled_at = Some(Utc::now());
        Ok(())
    }

    /// An account may only be deleted once no user refers to it
    async fn guard_delete(&self, account: &Account) -> Result<()> {
        let users = self
            .directory
            .users_of_account(&account.metadata.namespace, &account.metadata.name)
            .await?;
        if !users.is_empty() {
            return Err(NauthError::DeleteGuard {
                account: account.metadata.key(),
                users: users.len(),
            });
        }
        Ok(())
    }

    pub async fn reconcile_user(&self, user: &mut User) -> Result<UserAction> {
        let action = plan_user(user);
        let key = user.metadata.key();
        debug!(user = %key, action = ?action, "Reconciling user");

        match self.apply_user(action, user).await {
            Ok(()) => {
                info!(user = %key, action = ?action, "User reconciled");
                Ok(action)
            }
            Err(e) => {
                error!(user = %key, action = ?action, error = %e, "User reconcile failed");
                user.status.ready = false;
                user.status.message = Some(e.to_string());
                user.status.reconciled_at = Some(Utc::now());
                Err(e)
            }
        }
    }

    async fn apply_user(&self, action: UserAction, user: &mut User) -> Result<()> {
        let account = self
            .directory
            .account(&user.metadata.namespace, &user.spec.account_name)
            .await;
        let key = user.metadata.key();

        match action {
            UserAction::Delete => {
                // the account may already be gone; its credentials go with it
                let provider = match &account {
                    Ok(account) => self.providers.provider_for(account)?,
                    Err(_) => {
                        debug!(user = %key, "Account absent, falling back to default provider");
                        self.providers.default_provider()
                    }
                };
                self.bounded(&key, provider.delete_user(user)).await
            }
            UserAction::CreateOrUpdate => {
                let provider = self.providers.provider_for(&account?)?;
                let outcome = self
                    .bounded(&key, provider.create_or_update_user(user))
                    .await?;

                user.metadata.set_label(LABEL_USER_ID, outcome.user_id);
                user.metadata
                    .set_label(LABEL_USER_ACCOUNT_ID, outcome.account_id);
                user.metadata
                    .set_label(LABEL_USER_SIGNED_BY, outcome.signer_id);
                user.status.claims = Some(outcome.claims);
                user.status.ready = true;
                user.status.message = None;
                user.status.reconciled_at = Some(Utc::now());
                Ok(())
            }
        }
    }

    async fn bounded<T>(
        &self,
        what: &str,
        operation: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| NauthError::Timeout(format!("reconcile {what}")))?
    }
}
