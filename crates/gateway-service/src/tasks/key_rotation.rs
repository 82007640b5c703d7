//! Signing key rotation task.
//!
//! Calls [`KeyManager::rotate`] once per interval. The first rotation happens
//! one full interval after startup. A failed rotation keeps the current key
//! and is retried at the next tick.
//!
//! # Graceful Shutdown
//!
//! The task exits when the cancellation token is triggered. A rotation in
//! progress completes first.

use crate::services::key_manager::KeyManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

#[instrument(skip_all, name = "gw.task.key_rotation")]
pub async fn start_key_rotation(
    keys: Arc<KeyManager>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "gw.task.key_rotation",
        interval_seconds = period.as_secs(),
        "Starting key rotation task"
    );

    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match keys.rotate().await {
                    Ok(key_id) => {
                        info!(target: "gw.task.key_rotation", key_id = %key_id, "Scheduled key rotation complete");
                    }
                    Err(e) => {
                        tracing::error!(
                            target: "gw.task.key_rotation",
                            error = %e,
                            "Scheduled key rotation failed, keeping current key"
                        );
                    }
                }
                keys.report_key_age();
            }
            _ = cancel_token.cancelled() => {
                info!(target: "gw.task.key_rotation", "Key rotation task received shutdown signal, exiting");
                break;
            }
        }
    }
}
