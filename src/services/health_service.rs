use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Report storage availability, probing the backend when one is installed.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.backend().await {
        Some(backend) => {
            if let Err(err) = backend.sessions.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        None => warn!("no storage backend installed (degraded mode)"),
    }

    HealthResponse {
        status: if state.is_degraded().await {
            HealthStatus::Degraded
        } else {
            HealthStatus::Ok
        },
        live_rooms: state.rooms().room_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, dao::session_store::StorageBackend, state::AppState};

    #[tokio::test]
    async fn status_follows_the_backend() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, HealthStatus::Degraded);

        state.set_backend(StorageBackend::memory().0).await;
        let health = health_status(&state).await;
        assert_eq!(health.status, HealthStatus::Ok);
        assert_eq!(health.live_rooms, 0);
    }
}
