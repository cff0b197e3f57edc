//! Ephemeral per-session working directories.

use super::SessionId;
use crate::error::BrokerError;
use secrecy::SecretVec;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;

/// File the provider writes once the session authenticates.
pub const CREDENTIAL_FILE: &str = "creds.json";

/// A working directory found under the store root.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub id: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Filesystem store holding one working directory per session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working directory path for a session.
    pub fn path(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Create the session's working directory (idempotent).
    pub async fn create(&self, id: &SessionId) -> Result<PathBuf, BrokerError> {
        let path = self.path(id);
        fs::create_dir_all(&path).await?;
        debug!(session_id = %id, path = %path.display(), "Working directory created");
        Ok(path)
    }

    /// Remove the session's working directory and everything in it.
    ///
    /// Removing a directory that does not exist is not an error.
    pub async fn remove(&self, id: &SessionId) -> Result<(), BrokerError> {
        remove_dir(&self.path(id)).await
    }

    pub async fn exists(&self, id: &SessionId) -> bool {
        fs::try_exists(self.path(id)).await.unwrap_or(false)
    }

    /// Read a file from the session's working directory.
    ///
    /// Returns `Ok(None)` when the file does not exist yet.
    pub async fn read_artifact(
        &self,
        id: &SessionId,
        name: &str,
    ) -> Result<Option<SecretVec<u8>>, BrokerError> {
        match fs::read(self.path(id).join(name)).await {
            Ok(bytes) => Ok(Some(SecretVec::new(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List every working directory under the root.
    pub async fn entries(&self) -> Result<Vec<StoreEntry>, BrokerError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                // Removed between listing and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_dir() {
                continue;
            }

            entries.push(StoreEntry {
                id: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                modified: metadata.modified()?,
            });
        }

        Ok(entries)
    }

    /// Remove one entry returned by [`SessionStore::entries`].
    pub async fn remove_entry(&self, entry: &StoreEntry) -> Result<(), BrokerError> {
        remove_dir(&entry.path).await
    }

    /// Remove every working directory. Returns how many were removed.
    pub async fn remove_all(&self) -> Result<usize, BrokerError> {
        let entries = self.entries().await?;
        for entry in &entries {
            self.remove_entry(entry).await?;
        }
        Ok(entries.len())
    }
}

async fn remove_dir(path: &Path) -> Result<(), BrokerError> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
