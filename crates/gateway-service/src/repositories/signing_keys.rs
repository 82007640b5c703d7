//! Signing key persistence.
//!
//! The key file is a small JSON document:
//! `{"key_id": "...", "created_at_ms": 1700000000000, "secret": "<base64>"}`.
//! Writes go to a sibling temp file that is then renamed over the target, so a
//! crash never leaves a half-written key behind.

use crate::crypto::SigningKey;
use crate::errors::GatewayError;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Persistence boundary for the active signing key.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Load the persisted key, `None` if nothing has been stored yet.
    async fn load(&self) -> Result<Option<SigningKey>, GatewayError>;

    /// Persist `key`, replacing any previous one.
    async fn save(&self, key: &SigningKey) -> Result<(), GatewayError>;

    /// Remove the persisted key.
    async fn delete(&self) -> Result<(), GatewayError>;
}

#[derive(Serialize, Deserialize)]
struct StoredKey {
    key_id: String,
    created_at_ms: i64,
    secret: String,
}

/// Stores the key as JSON at a fixed path (mode 0600 on unix).
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    #[instrument(skip_all)]
    async fn load(&self) -> Result<Option<SigningKey>, GatewayError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(GatewayError::KeyPersistence(format!(
                    "Failed to read key file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let stored: StoredKey = serde_json::from_slice(&bytes).map_err(|e| {
            GatewayError::KeyPersistence(format!(
                "Key file {} is not valid JSON: {}",
                self.path.display(),
                e
            ))
        })?;

        let secret = general_purpose::STANDARD
            .decode(stored.secret.as_bytes())
            .map_err(|e| {
                GatewayError::KeyPersistence(format!("Key file secret is not base64: {}", e))
            })?;

        SigningKey::from_parts(stored.key_id, secret, stored.created_at_ms).map(Some)
    }

    #[instrument(skip_all)]
    async fn save(&self, key: &SigningKey) -> Result<(), GatewayError> {
        let stored = StoredKey {
            key_id: key.key_id().to_string(),
            created_at_ms: key.created_at_ms(),
            secret: general_purpose::STANDARD.encode(key.secret_bytes()),
        };
        let body = serde_json::to_vec(&stored)
            .map_err(|e| GatewayError::KeyPersistence(format!("Key serialization failed: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GatewayError::KeyPersistence(format!(
                    "Failed to create key directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &body).await.map_err(|e| {
            GatewayError::KeyPersistence(format!("Failed to write {}: {}", temp.display(), e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| {
                    GatewayError::KeyPersistence(format!(
                        "Failed to restrict permissions on {}: {}",
                        temp.display(),
                        e
                    ))
                })?;
        }

        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            GatewayError::KeyPersistence(format!(
                "Failed to move key into place at {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(target: "gw.keys", key_id = %key.key_id(), "Signing key persisted");
        Ok(())
    }

    async fn delete(&self) -> Result<(), GatewayError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GatewayError::KeyPersistence(format!(
                "Failed to delete key file {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Keeps nothing. Used when no key path is configured; keys live only in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct EphemeralKeyStore;

#[async_trait]
impl KeyStore for EphemeralKeyStore {
    async fn load(&self) -> Result<Option<SigningKey>, GatewayError> {
        Ok(None)
    }

    async fn save(&self, _key: &SigningKey) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn delete(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}
