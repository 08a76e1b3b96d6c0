use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    dao::{session_store::StorageBackend, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep a storage backend installed, toggling degraded mode as it comes and goes.
///
/// Runs forever: connects with exponential backoff, polls the installed backend
/// and, when in-place reconnection gives up, drops it and starts over.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<StorageBackend, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(backend) => {
                state.set_backend(backend.clone()).await;
                info!("storage connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch_health(&state, &backend).await;

                error!("storage lost; clearing backend until a new connection succeeds");
                state.clear_backend().await;
            }
            Err(err) => warn!(error = %err, retry_in = ?delay, "storage connection attempt failed"),
        }

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Poll `backend` until it fails and cannot be recovered in place.
async fn watch_health(state: &SharedState, backend: &StorageBackend) {
    loop {
        match backend.sessions.health_check().await {
            Ok(()) => {
                if state.is_degraded().await {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed; entering degraded mode");
                state.update_degraded(true).await;
                if !recover(backend).await {
                    return;
                }
                info!("storage reconnected after health check failure");
                state.update_degraded(false).await;
            }
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn recover(backend: &StorageBackend) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        match backend.sessions.try_reconnect().await {
            Ok(()) => return true,
            Err(err) => {
                warn!(attempt, error = %err, "storage reconnect attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    #[tokio::test(start_paused = true)]
    async fn backend_is_installed_after_failed_attempts() {
        let state = AppState::new(AppConfig::default());
        let mut calls = 0u32;
        let supervisor = tokio::spawn(run(state.clone(), move || {
            calls += 1;
            let fail = calls < 3;
            async move {
                if fail {
                    Err(StorageError::unavailable(
                        "not yet".into(),
                        std::io::Error::other("connection refused"),
                    ))
                } else {
                    Ok(StorageBackend::memory().0)
                }
            }
        }));

        let mut watcher = state.degraded_watcher();
        tokio::time::timeout(Duration::from_secs(60), watcher.wait_for(|degraded| !degraded))
            .await
            .unwrap()
            .unwrap();
        assert!(state.backend().await.is_some());
        supervisor.abort();
    }
}
