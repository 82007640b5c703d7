//! Deterministic cryptographic fixtures for testing
//!
//! Signing keys are derived from a seed, so the same seed always yields the
//! same key id and secret.

use async_trait::async_trait;
use gateway_service::crypto::SigningKey;
use gateway_service::errors::GatewayError;
use gateway_service::repositories::{EphemeralKeyStore, KeyStore};
use gateway_service::services::key_manager::KeyManager;
use ring::digest::{digest, SHA512};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Fixed creation time for fixture keys (2023-11-14T22:13:20Z).
pub const TEST_KEY_CREATED_AT_MS: i64 = 1_700_000_000_000;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// Generate a deterministic HS256 signing key for testing.
///
/// The secret is SHA-512 of `gateway-test-key-<seed>` (64 bytes) and the key
/// id is `test-key-<seed>`.
///
/// # Example
/// ```rust,ignore
/// let key = test_signing_key(1)?;
/// assert_eq!(key.key_id(), "test-key-1");
/// assert_eq!(key.secret_bytes(), test_signing_key(1)?.secret_bytes());
/// ```
pub fn test_signing_key(seed: u8) -> Result<SigningKey, FixtureError> {
    let material = format!("gateway-test-key-{}", seed);
    let secret = digest(&SHA512, material.as_bytes()).as_ref().to_vec();

    SigningKey::from_parts(format!("test-key-{}", seed), secret, TEST_KEY_CREATED_AT_MS)
        .map_err(|e| FixtureError::Crypto(e.to_string()))
}

/// Key manager holding the fixture key for `seed`, with no persistence.
pub fn test_key_manager(seed: u8) -> Result<Arc<KeyManager>, FixtureError> {
    Ok(Arc::new(KeyManager::with_key(
        test_signing_key(seed)?,
        Arc::new(EphemeralKeyStore),
    )))
}

/// Key store whose writes always fail. Loads return nothing.
#[derive(Debug, Default)]
pub struct FailingKeyStore {
    save_attempts: AtomicUsize,
}

impl FailingKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far.
    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyStore for FailingKeyStore {
    async fn load(&self) -> Result<Option<SigningKey>, GatewayError> {
        Ok(None)
    }

    async fn save(&self, _key: &SigningKey) -> Result<(), GatewayError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        Err(GatewayError::KeyPersistence(
            "simulated disk failure".to_string(),
        ))
    }

    async fn delete(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}
