//! Expired token and code sweeper.
//!
//! Periodically purges rows the lifecycle would reject anyway, so the
//! durable tables do not grow without bound. Supports graceful shutdown via
//! a cancellation token.

use crate::lifecycle::TokenLifecycleManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

#[instrument(skip_all, name = "auth.task.token_sweeper")]
pub async fn start_token_sweeper(
    lifecycle: Arc<TokenLifecycleManager>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "auth.tasks.sweeper",
        interval_secs = interval.as_secs(),
        "Starting token sweeper task"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so startup is not a sweep.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match lifecycle.purge_expired().await {
                    Ok(counts) if counts.total() > 0 => {
                        info!(
                            target: "auth.tasks.sweeper",
                            authorization_codes = counts.authorization_codes,
                            tokens = counts.tokens,
                            sessions = counts.sessions,
                            "Purged expired rows"
                        );
                    }
                    Ok(_) => {
                        debug!(target: "auth.tasks.sweeper", "Nothing to purge");
                    }
                    Err(e) => {
                        // Store may recover by the next tick.
                        error!(
                            target: "auth.tasks.sweeper",
                            error = %e,
                            "Sweep failed"
                        );
                    }
                }
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "auth.tasks.sweeper",
                    "Token sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }
}
