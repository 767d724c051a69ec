use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::state::SharedState;

/// Periodically purge expired verification codes, reset links and
/// elapsed sign-in throttling windows until shutdown is signalled.
pub fn spawn_sweeper(state: SharedState, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(run(state, shutdown))
}

async fn run(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let interval = state.config.sweep_interval;
    tracing::info!("Sweeper started (every {}s)", interval.as_secs());

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => sweep(&state).await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Sweeper stopped");
}

/// One pass. Failures are logged and retried on the next tick.
pub async fn sweep(state: &SharedState) {
    match state.store.purge_expired(Utc::now()).await {
        Ok(0) => {}
        Ok(n) => tracing::debug!("Purged {n} expired codes and reset links"),
        Err(e) => tracing::error!("Sweep failed: {e}"),
    }

    let dropped = state.login_limiter.cleanup();
    if dropped > 0 {
        tracing::debug!("Dropped {dropped} elapsed sign-in windows");
    }
}
