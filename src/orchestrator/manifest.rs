//! Resource manifests on disk
//!
//! Each `.yaml`, `.yml` or `.json` file holds one resource tagged by
//! `kind: Account` or `kind: User`. Reconciled labels and status are written
//! back to the same file in the same format.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::spec::{Account, User};
use crate::types::{NauthError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    Account(Account),
    User(User),
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub resource: Resource,
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

fn is_manifest(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    )
}

/// Parse one manifest; resources without a namespace land in `default_namespace`
pub async fn load(path: &Path, default_namespace: &str) -> Result<Manifest> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| NauthError::Config(format!("Failed to read {}: {e}", path.display())))?;
    let mut resource: Resource = if is_json(path) {
        serde_json::from_str(&text)
            .map_err(|e| NauthError::Config(format!("{}: {e}", path.display())))?
    } else {
        serde_yaml::from_str(&text)
            .map_err(|e| NauthError::Config(format!("{}: {e}", path.display())))?
    };

    let meta = match &mut resource {
        Resource::Account(a) => &mut a.metadata,
        Resource::User(u) => &mut u.metadata,
    };
    if meta.namespace.is_empty() {
        meta.namespace = default_namespace.to_string();
    }
    if meta.uid.is_empty() {
        meta.uid = uuid::Uuid::new_v4().to_string();
    }

    Ok(Manifest {
        path: path.to_path_buf(),
        resource,
    })
}

/// Every manifest directly under `dir`, sorted by file name
pub async fn load_dir(dir: &Path, default_namespace: &str) -> Result<Vec<Manifest>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| NauthError::Config(format!("Failed to read {}: {e}", dir.display())))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_manifest(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut manifests = Vec::with_capacity(paths.len());
    for path in paths {
        manifests.push(load(&path, default_namespace).await?);
    }
    debug!(dir = %dir.display(), count = manifests.len(), "Loaded manifests");
    Ok(manifests)
}

impl Manifest {
    pub async fn save(&self) -> Result<()> {
        let text = if is_json(&self.path) {
            serde_json::to_string_pretty(&self.resource)?
        } else {
            serde_yaml::to_string(&self.resource)?
        };
        tokio::fs::write(&self.path, text).await?;
        Ok(())
    }

    /// Remove the manifest of a deleted resource
    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
