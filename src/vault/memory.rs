//! In-memory secret store

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{Labels, SecretLocation, SecretRecord, SecretStore};
use crate::types::{NauthError, Result};

/// Secret store backed by a concurrent map; contents are lost on drop
#[derive(Default)]
pub struct MemorySecretStore {
    records: DashMap<SecretLocation, SecretRecord>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn not_found(location: &SecretLocation) -> NauthError {
    NauthError::SecretNotFound {
        namespace: location.namespace.clone(),
        name: location.name.clone(),
    }
}

#[async_trait::async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, location: &SecretLocation) -> Result<SecretRecord> {
        self.records
            .get(location)
            .map(|r| r.value().clone())
            .ok_or_else(|| not_found(location))
    }

    async fn list(&self, namespace: &str, selector: &Labels) -> Result<Vec<SecretRecord>> {
        let mut found: Vec<SecretRecord> = self
            .records
            .iter()
            .filter(|r| r.namespace == namespace && r.matches(selector))
            .map(|r| r.value().clone())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn create(&self, record: SecretRecord) -> Result<()> {
        let location = record.location();
        match self.records.entry(location) {
            Entry::Occupied(e) => Err(NauthError::Store(format!(
                "Secret {} already exists",
                e.key()
            ))),
            Entry::Vacant(e) => {
                e.insert(record);
                Ok(())
            }
        }
    }

    async fn update(&self, record: SecretRecord) -> Result<()> {
        let location = record.location();
        match self.records.get_mut(&location) {
            Some(mut existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(not_found(&location)),
        }
    }

    async fn delete(&self, location: &SecretLocation) -> Result<()> {
        self.records
            .remove(location)
            .map(|_| ())
            .ok_or_else(|| not_found(location))
    }

    async fn delete_by_labels(&self, namespace: &str, selector: &Labels) -> Result<usize> {
        let before = self.records.len();
        self.records
            .retain(|_, r| !(r.namespace == namespace && r.matches(selector)));
        Ok(before - self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{labels, LABEL_SECRET_TYPE};
    use std::collections::BTreeMap;

    fn record(ns: &str, name: &str, kind: &str) -> SecretRecord {
        SecretRecord {
            namespace: ns.into(),
            name: name.into(),
            labels: labels([(LABEL_SECRET_TYPE, kind)]),
            owner: None,
            data: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let store = MemorySecretStore::new();
        let loc = SecretLocation::new("ns", "a");

        assert!(store.get(&loc).await.unwrap_err().is_not_found());

        store.create(record("ns", "a", "account-root")).await.unwrap();
        assert!(store.create(record("ns", "a", "account-root")).await.is_err());

        store.update(record("ns", "a", "account-sign")).await.unwrap();
        let got = store.get(&loc).await.unwrap();
        assert_eq!(got.labels[LABEL_SECRET_TYPE], "account-sign");

        store.delete(&loc).await.unwrap();
        assert!(store.delete(&loc).await.unwrap_err().is_not_found());
        assert!(store.update(record("ns", "a", "x")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_and_delete_by_labels_are_namespaced() {
        let store = MemorySecretStore::new();
        store.create(record("ns", "a", "account-root")).await.unwrap();
        store.create(record("ns", "b", "account-root")).await.unwrap();
        store.create(record("other", "c", "account-root")).await.unwrap();
        store.create(record("ns", "d", "operator-sign")).await.unwrap();

        let selector = labels([(LABEL_SECRET_TYPE, "account-root")]);
        let found = store.list("ns", &selector).await.unwrap();
        assert_eq!(
            found.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        assert_eq!(store.delete_by_labels("ns", &selector).await.unwrap(), 2);
        assert_eq!(store.delete_by_labels("ns", &selector).await.unwrap(), 0);
        assert_eq!(store.len(), 2);
    }
}
