//! User credential manager
//!
//! Users get a fresh key pair on every reconcile; the signed JWT and seed
//! are bundled into a `.creds` document stored in a secret owned by the
//! user resource. Earlier key pairs are superseded, never revoked.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::claims::{build_user_claims, ImportResolver};
use crate::keys;
use crate::orchestrator::AccountDirectory;
use crate::spec::{
    OwnerRef, User, UserClaimsView, LABEL_USER_ACCOUNT_ID, LABEL_USER_ID, LABEL_USER_SIGNED_BY,
};
use crate::types::Result;
use crate::vault::{labels, KeyVault, SecretLocation, SecretType, CREDS_KEY, LABEL_SECRET_TYPE};

/// Outcome of a successful user issuance
#[derive(Debug, Clone, PartialEq)]
pub struct UserResult {
    pub user_id: String,
    pub account_id: String,
    /// Account signing public key that issued the user
    pub signer_id: String,
    pub claims: UserClaimsView,
}

pub struct UserManager {
    vault: KeyVault,
    accounts: Arc<dyn AccountDirectory>,
}

impl UserManager {
    pub fn new(vault: KeyVault, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self { vault, accounts }
    }

    pub async fn create_or_update(&self, user: &User) -> Result<UserResult> {
        let name = &user.metadata.name;
        let namespace = &user.metadata.namespace;
        let account_name = &user.spec.account_name;

        let account_id = self
            .accounts
            .resolve_account_id(namespace, account_name)
            .await
            .map_err(|e| e.context(&format!("account of user {name}")))?;
        let account_id = account_id.as_str();
        let account_keys = self
            .vault
            .account_keys(namespace, account_name, Some(account_id))
            .await?;

        let user_key = keys::generate_user_key();
        let user_id = user_key.public_key();
        let signer_id = account_keys.signing.public_key();
        debug!(user = %name, user_id = %user_id, "Generated user key");

        let claims = build_user_claims(name, &user_id, account_id, &user.spec)?;
        let jwt = claims.sign(&account_keys.signing)?;
        let creds = keys::format_credentials(&jwt, &keys::seed_of(&user_key)?);

        let location = SecretLocation::new(namespace, &user.credentials_secret_name());
        let secret_labels = labels([
            (LABEL_SECRET_TYPE, SecretType::UserCredentials.as_str()),
            (LABEL_USER_ID, user_id.as_str()),
            (LABEL_USER_ACCOUNT_ID, account_id),
            (LABEL_USER_SIGNED_BY, signer_id.as_str()),
        ]);
        self.vault
            .apply(
                Some(OwnerRef::user(&user.metadata)),
                &location,
                secret_labels,
                BTreeMap::from([(CREDS_KEY.to_string(), creds)]),
            )
            .await
            .map_err(|e| e.context(&format!("store credentials of user {name}")))?;

        info!(user = %name, user_id = %user_id, account_id = %account_id, "User credentials issued");
        Ok(UserResult {
            claims: claims.view(account_name),
            user_id,
            account_id: account_id.to_string(),
            signer_id,
        })
    }

    /// Remove the user's credentials secret; absent is success.
    ///
    /// The owning account may be unissued or already gone.
    pub async fn delete(&self, user: &User) -> Result<()> {
        let namespace = &user.metadata.namespace;
        let account_id = match self
            .accounts
            .resolve_account_id_lenient(namespace, &user.spec.account_name)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                debug!(user = %user.metadata.name, error = %e, "Owning account not found");
                None
            }
        };

        let location = SecretLocation::new(namespace, &user.credentials_secret_name());
        self.vault.delete(&location).await?;
        info!(
            user = %user.metadata.name,
            account_id = account_id.as_deref().unwrap_or("<unissued>"),
            "User credentials deleted"
        );
        Ok(())
    }
}
