//! Active signing key ownership and rotation.
//!
//! The key ring is swapped atomically with `ArcSwap`: a validation in flight
//! sees either the ring before a rotation or the ring after it, never a mix.
//! Exactly one previous generation is retained.

use crate::crypto::SigningKey;
use crate::errors::GatewayError;
use crate::observability::metrics::{
    record_key_rotation, set_key_rotation_last_success, set_signing_key_age_seconds,
};
use crate::repositories::signing_keys::KeyStore;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// Active key plus the generation it replaced.
#[derive(Debug)]
pub struct KeyRing {
    pub active: Arc<SigningKey>,
    pub previous: Option<Arc<SigningKey>>,
}

pub struct KeyManager {
    ring: ArcSwap<KeyRing>,
    store: Arc<dyn KeyStore>,
    rotation: Mutex<()>,
}

impl KeyManager {
    /// Start from a known key without touching the store.
    pub fn with_key(key: SigningKey, store: Arc<dyn KeyStore>) -> Self {
        Self {
            ring: ArcSwap::from_pointee(KeyRing {
                active: Arc::new(key),
                previous: None,
            }),
            store,
            rotation: Mutex::new(()),
        }
    }

    /// Load the persisted key, or generate and persist a fresh one.
    ///
    /// A store that cannot be read is a startup error.
    #[instrument(skip_all)]
    pub async fn initialize(store: Arc<dyn KeyStore>) -> Result<Self, GatewayError> {
        let key = match store.load().await? {
            Some(key) => {
                tracing::info!(target: "gw.keys", key_id = %key.key_id(), "Loaded signing key");
                key
            }
            None => {
                let key = SigningKey::generate()?;
                store.save(&key).await?;
                tracing::info!(target: "gw.keys", key_id = %key.key_id(), "Generated signing key");
                key
            }
        };

        Ok(Self::with_key(key, store))
    }

    /// Current active key. Lock-free.
    pub fn active_key(&self) -> Arc<SigningKey> {
        Arc::clone(&self.ring.load().active)
    }

    /// Snapshot of the active and previous keys.
    pub fn key_ring(&self) -> Arc<KeyRing> {
        self.ring.load_full()
    }

    /// Replace the active key.
    ///
    /// The new key is persisted before it is swapped in. If persisting fails
    /// the current ring is left untouched and the error is returned.
    #[instrument(skip_all)]
    pub async fn rotate(&self) -> Result<String, GatewayError> {
        let _guard = self.rotation.lock().await;

        let new_key = match SigningKey::generate() {
            Ok(key) => key,
            Err(e) => {
                record_key_rotation("error");
                return Err(e);
            }
        };

        if let Err(e) = self.store.save(&new_key).await {
            record_key_rotation("error");
            tracing::error!(
                target: "gw.keys",
                error = %e,
                "Key rotation aborted: new key could not be persisted, keeping current key"
            );
            return Err(match e {
                GatewayError::KeyPersistence(_) => e,
                other => GatewayError::KeyPersistence(other.to_string()),
            });
        }

        let new_key = Arc::new(new_key);
        let new_key_id = new_key.key_id().to_string();
        let current = self.ring.load_full();
        self.ring.store(Arc::new(KeyRing {
            active: new_key,
            previous: Some(Arc::clone(&current.active)),
        }));

        record_key_rotation("success");
        set_key_rotation_last_success(chrono::Utc::now().timestamp() as f64);
        set_signing_key_age_seconds(0.0);

        tracing::info!(
            target: "gw.keys",
            key_id = %new_key_id,
            previous_key_id = %current.active.key_id(),
            "Signing key rotated"
        );

        Ok(new_key_id)
    }

    /// Publish the active key age gauge.
    pub fn report_key_age(&self) {
        let age_ms = chrono::Utc::now()
            .timestamp_millis()
            .saturating_sub(self.active_key().created_at_ms());
        set_signing_key_age_seconds(age_ms.max(0) as f64 / 1000.0);
    }
}
