//! Background expiry sweeps.
//!
//! Reads already hide expired contexts; the sweeper reclaims their memory so
//! abandoned conversations do not accumulate.

use crate::store::ContextStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spawns a task that sweeps `store` every `interval` until `cancel` fires.
pub fn spawn_sweeper(
    store: Arc<dyn ContextStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so the first sweep
        // happens one interval after start.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("context sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match store.sweep().await {
                        Ok(removed) if removed > 0 => {
                            debug!(removed, "periodic context sweep");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "failed to sweep expired contexts");
                        }
                    }
                }
            }
        }
    })
}
