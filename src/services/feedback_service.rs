use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{FeedbackEntity, SessionStatus},
    dto::feedback::FeedbackRequest,
    error::ServiceError,
    state::SharedState,
};

/// Attach a rating to a finished session.
pub async fn submit_feedback(
    state: &SharedState,
    session_id: Uuid,
    request: FeedbackRequest,
) -> Result<(), ServiceError> {
    let backend = state.require_backend().await?;

    let session = backend
        .sessions
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session {session_id}")))?;
    if session.status != SessionStatus::Completed {
        return Err(ServiceError::InvalidState(
            "feedback opens once the game is over".into(),
        ));
    }

    let comment = request
        .comment
        .map(|comment| comment.trim().to_owned())
        .filter(|comment| !comment.is_empty());
    let stored = backend
        .sessions
        .append_feedback(
            session_id,
            FeedbackEntity {
                rating: request.rating,
                comment,
                submitted_at: SystemTime::now(),
            },
        )
        .await?;
    if !stored {
        return Err(ServiceError::NotFound(format!("session {session_id}")));
    }

    info!(session_id = %session_id, rating = request.rating, "feedback recorded");
    Ok(())
}
