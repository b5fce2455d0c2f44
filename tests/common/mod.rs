//! Fakes shared by the lifecycle integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use nauth::account::AccountManager;
use nauth::keys;
use nauth::nats::ClusterControl;
use nauth::orchestrator::{InMemoryDirectory, LocalNatsProvider, ProviderRegistry, Reconciler};
use nauth::user::UserManager;
use nauth::vault::{
    labels, KeyVault, Labels, MemorySecretStore, SecretLocation, SecretRecord, SecretStore,
    LABEL_SECRET_TYPE, SEED_KEY,
};
use nauth::Result;
use nkeys::KeyPair;

pub const OPERATOR_NAMESPACE: &str = "nauth-system";
pub const TENANTS: &str = "tenants";

/// Cluster fake recording every control-plane call
#[derive(Default)]
pub struct FakeCluster {
    pub uploads: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
    pub published: Mutex<HashMap<String, String>>,
}

impl FakeCluster {
    pub fn uploads(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn deletes(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }

    /// Pretend another party published `jwt`
    pub fn publish_external(&self, account_id: &str, jwt: &str) {
        self.published
            .lock()
            .unwrap()
            .insert(account_id.to_string(), jwt.to_string());
    }
}

#[async_trait::async_trait]
impl ClusterControl for FakeCluster {
    async fn ensure_connected(&self, _namespace: &str) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn upload_claims(&self, jwt: &str) -> Result<()> {
        let claims = nauth::claims::decode_account_jwt(jwt)?;
        self.publish_external(&claims.subject, jwt);
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

/// Secret store wrapper counting label-selector deletions
pub struct CountingStore {
    pub inner: MemorySecretStore,
    pub label_deletes: Mutex<Vec<Labels>>,
}

#[async_trait::async_trait]
impl SecretStore for CountingStore {
    async fn get(&self, location: &SecretLocation) -> Result<SecretRecord> {
        self.inner.get(location).await
    }
    async fn list(&self, namespace: &str, selector: &Labels) -> Result<Vec<SecretRecord>> {
        self.inner.list(namespace, selector).await
    }
    async fn create(&self, record: SecretRecord) -> Result<()> {
        self.inner.create(record).await
    }
    async fn update(&self, record: SecretRecord) -> Result<()> {
        self.inner.update(record).await
    }
    async fn delete(&self, location: &SecretLocation) -> Result<()> {
        self.inner.delete(location).await
    }
    async fn delete_by_labels(&self, namespace: &str, selector: &Labels) -> Result<usize> {
        self.label_deletes.lock().unwrap().push(selector.clone());
        self.inner.delete_by_labels(namespace, selector).await
    }
}

pub struct Harness {
    pub store: Arc<CountingStore>,
    pub vault: KeyVault,
    pub cluster: Arc<FakeCluster>,
    pub directory: Arc<InMemoryDirectory>,
    pub operator: KeyPair,
    pub reconciler: Reconciler,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(CountingStore {
            inner: MemorySecretStore::new(),
            label_deletes: Mutex::new(Vec::new()),
        });
        let operator = KeyPair::new_operator();
        store
            .create(seed_record(
                OPERATOR_NAMESPACE,
                "operator-sign",
                &operator,
                labels([(LABEL_SECRET_TYPE, "operator-sign")]),
            ))
            .await
            .unwrap();

        let vault = KeyVault::new(store.clone());
        let cluster = Arc::new(FakeCluster::default());
        let directory = Arc::new(InMemoryDirectory::new());

        let accounts = AccountManager::new(
            vault.clone(),
            cluster.clone(),
            directory.clone(),
            OPERATOR_NAMESPACE,
        );
        let users = UserManager::new(vault.clone(), directory.clone());
        let provider = Arc::new(LocalNatsProvider::new(accounts, users));
        let reconciler = Reconciler::new(ProviderRegistry::new(provider), directory.clone());

        Self {
            store,
            vault,
            cluster,
            directory,
            operator,
            reconciler,
        }
    }

    pub async fn secrets_in(&self, namespace: &str) -> Vec<SecretRecord> {
        self.store
            .list(namespace, &Labels::new())
            .await
            .unwrap()
    }
}

/// Unlabeled record holding one seed
pub fn seed_record(namespace: &str, name: &str, kp: &KeyPair, labels: Labels) -> SecretRecord {
    SecretRecord {
        namespace: namespace.into(),
        name: name.into(),
        labels,
        owner: None,
        data: [(SEED_KEY.to_string(), keys::seed_of(kp).unwrap())].into(),
    }
}
