//! Shared fakes for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use nkeys::KeyPair;

use crate::claims::ImportResolver;
use crate::keys;
use crate::nats::ClusterControl;
use crate::types::{NauthError, Result};
use crate::vault::{
    labels, KeyVault, MemorySecretStore, SecretRecord, SecretStore, LABEL_SECRET_TYPE, SEED_KEY,
};

pub const OPERATOR_NAMESPACE: &str = "nauth-system";

/// Cluster that records every request and answers lookups from what was uploaded
#[derive(Default)]
pub struct RecordingCluster {
    pub uploads: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
    pub published: Mutex<HashMap<String, String>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub reject_uploads: bool,
    pub fail_connect: bool,
}

impl RecordingCluster {
    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ClusterControl for RecordingCluster {
    async fn ensure_connected(&self, _namespace: &str) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(NauthError::Nats("connection refused".into()));
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn upload_claims(&self, jwt: &str) -> Result<()> {
        if self.reject_uploads {
            return Err(NauthError::ClusterRejected {
                code: 500,
                message: "rejected".into(),
            });
        }
        let claims = crate::claims::decode_account_jwt(jwt)?;
        self.published
            .lock()
            .unwrap()
            .insert(claims.subject, jwt.to_string());
        self.uploads.lock().unwrap().push(jwt.to_string());
        Ok(())
    }

    async fn delete_claims(&self, jwt: &str) -> Result<()> {
        self.deletes.lock().unwrap().push(jwt.to_string());
        Ok(())
    }

    async fn lookup_claims(&self, account_id: &str) -> Result<String> {
        Ok(self
            .published
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Resolver backed by a fixed `namespace/name -> id` table
#[derive(Default)]
pub struct StaticResolver(pub HashMap<String, String>);

#[async_trait::async_trait]
impl ImportResolver for StaticResolver {
    async fn resolve_account_id_lenient(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        self.0
            .get(&format!("{namespace}/{name}"))
            .cloned()
            .map(Some)
            .ok_or_else(|| NauthError::Precondition(format!("account {namespace}/{name} not found")))
    }
}

/// Memory-backed vault seeded with one operator signing key
pub async fn vault_with_operator() -> (Arc<MemorySecretStore>, KeyVault, KeyPair) {
    let store = Arc::new(MemorySecretStore::new());
    let operator = KeyPair::new_operator();
    store
        .create(SecretRecord {
            namespace: OPERATOR_NAMESPACE.into(),
            name: "operator-sign".into(),
            labels: labels([(LABEL_SECRET_TYPE, "operator-sign")]),
            owner: None,
            data: [(SEED_KEY.to_string(), keys::seed_of(&operator).unwrap())].into(),
        })
        .await
        .unwrap();
    (store.clone(), KeyVault::new(store), operator)
}
