//! File-backed secret store
//!
//! One JSON document per record at `<root>/<namespace>/<name>.json`.
//! Writes go to a temporary sibling first and are renamed into place.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Labels, SecretLocation, SecretRecord, SecretStore};
use crate::types::{NauthError, Result};

pub struct FileSecretStore {
    root: PathBuf,
}

impl FileSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf> {
        validate_segment(namespace)?;
        Ok(self.root.join(namespace))
    }

    fn path_of(&self, location: &SecretLocation) -> Result<PathBuf> {
        validate_segment(&location.name)?;
        Ok(self
            .namespace_dir(&location.namespace)?
            .join(format!("{}.json", location.name)))
    }

    async fn read(&self, path: &Path, location: &SecretLocation) -> Result<SecretRecord> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                NauthError::Store(format!("Secret {location} is corrupt: {e}"))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(NauthError::SecretNotFound {
                    namespace: location.namespace.clone(),
                    name: location.name.clone(),
                })
            }
            Err(e) => Err(NauthError::Store(format!("Failed to read {location}: {e}"))),
        }
    }

    async fn write(&self, path: &Path, record: &SecretRecord) -> Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;
        write_private(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(secret = %record.location(), "Secret written");
        Ok(())
    }
}

#[cfg(unix)]
async fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Names become path segments; only DNS-label-like names are accepted
fn validate_segment(segment: &str) -> Result<()> {
    let ok = !segment.is_empty()
        && segment.len() <= 253
        && !segment.starts_with('.')
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(NauthError::Store(format!("Invalid secret path segment {segment:?}")))
    }
}

#[async_trait::async_trait]
impl SecretStore for FileSecretStore {
    async fn get(&self, location: &SecretLocation) -> Result<SecretRecord> {
        let path = self.path_of(location)?;
        self.read(&path, location).await
    }

    async fn list(&self, namespace: &str, selector: &Labels) -> Result<Vec<SecretRecord>> {
        let dir = self.namespace_dir(namespace)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let location = SecretLocation::new(namespace, name);
            let record = self.read(&path, &location).await?;
            if record.matches(selector) {
                found.push(record);
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn create(&self, record: SecretRecord) -> Result<()> {
        let location = record.location();
        let path = self.path_of(&location)?;
        if tokio::fs::try_exists(&path).await? {
            return Err(NauthError::Store(format!("Secret {location} already exists")));
        }
        self.write(&path, &record).await
    }

    async fn update(&self, record: SecretRecord) -> Result<()> {
        let location = record.location();
        let path = self.path_of(&location)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(NauthError::SecretNotFound {
                namespace: location.namespace,
                name: location.name,
            });
        }
        self.write(&path, &record).await
    }

    async fn delete(&self, location: &SecretLocation) -> Result<()> {
        let path = self.path_of(location)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(NauthError::SecretNotFound {
                    namespace: location.namespace.clone(),
                    name: location.name.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_by_labels(&self, namespace: &str, selector: &Labels) -> Result<usize> {
        let matching = self.list(namespace, selector).await?;
        let mut removed = 0;
        for record in matching {
            match self.delete(&record.location()).await {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }
}
