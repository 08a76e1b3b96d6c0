use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{AttemptEntity, HistoryEntity, ParticipantRef, SessionEntity, SessionResultEntity},
    dto::solo::{
        SoloAnswerRequest, SoloAnswerResponse, SoloFinishResponse, SoloStartRequest,
        SoloStartResponse,
    },
    error::ServiceError,
    services::{results_service, scoring},
    state::{
        SharedState, SoloGame,
        room::{RoomError, validate_quiz},
        solo::SoloAnswer,
    },
};

/// Open a solo session and hand out the questions without their answers.
pub async fn start(
    state: &SharedState,
    request: SoloStartRequest,
) -> Result<SoloStartResponse, ServiceError> {
    let backend = state.require_backend().await?;

    let quiz = backend
        .sessions
        .find_quiz(request.quiz_id.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz {}", request.quiz_id)))?;
    validate_quiz(&quiz).map_err(ServiceError::from)?;

    let participant = match (request.user_id, request.nickname) {
        (Some(user_id), _) => ParticipantRef::UserId(user_id),
        (None, Some(nickname)) => ParticipantRef::GuestNickname(nickname.trim().to_owned()),
        (None, None) => {
            return Err(ServiceError::InvalidInput(
                "either userId or nickname is required".into(),
            ));
        }
    };

    let session_id = Uuid::new_v4();
    backend
        .sessions
        .create_session(SessionEntity::solo(session_id, quiz.id.clone(), request.team_id))
        .await?;

    let response = SoloStartResponse::new(session_id.to_string(), &quiz);
    state
        .solo_games()
        .insert(session_id, SoloGame::new(session_id, quiz, participant));
    info!(session_id = %session_id, quiz_id = %response.quiz_id, "solo session started");
    Ok(response)
}

/// Grade one answer and store it in the history.
///
/// The answer is reserved before the write so a concurrent duplicate is
/// rejected; a failed write releases it again.
pub async fn answer(
    state: &SharedState,
    session_id: Uuid,
    request: SoloAnswerRequest,
) -> Result<SoloAnswerResponse, ServiceError> {
    let backend = state.require_backend().await?;

    let (record, response) = {
        let mut game = state
            .solo_games()
            .get_mut(&session_id)
            .ok_or_else(|| ServiceError::NotFound(format!("solo session {session_id}")))?;

        let question = game
            .quiz
            .questions
            .get(request.question_index)
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!(
                    "question {} does not exist",
                    request.question_index
                ))
            })?
            .clone();
        let option = question.options.get(request.option_index).ok_or_else(|| {
            ServiceError::from(RoomError::InvalidOption {
                option_index: request.option_index,
            })
        })?;
        let correct_option_index = question
            .options
            .iter()
            .position(|option| option.is_correct)
            .unwrap_or_default();

        let limit = f64::from(question.time_limit_secs);
        let remaining = request.remaining_secs.clamp(0.0, limit);
        let points_gained = if option.is_correct {
            scoring::score(question.points, question.time_limit_secs, remaining)
        } else {
            0
        };

        let graded = SoloAnswer {
            option_index: request.option_index,
            is_correct: option.is_correct,
            points_gained,
        };
        if !game.record(request.question_index, graded) {
            return Err(ServiceError::InvalidState(format!(
                "question {} already answered",
                request.question_index
            )));
        }

        let record = HistoryEntity {
            game_session_id: session_id,
            quiz_id: game.quiz.id.clone(),
            question_id: question.id.clone(),
            question_index: request.question_index,
            participant: game.participant.clone(),
            attempts: vec![AttemptEntity {
                selected_option_id: option.id.clone(),
                is_correct: option.is_correct,
                answer_time_ms: ((limit - remaining) * 1000.0).round() as u64,
            }],
            is_ultimately_correct: option.is_correct,
            final_score_gained: points_gained,
        };
        let response = SoloAnswerResponse {
            question_index: request.question_index,
            is_correct: option.is_correct,
            correct_option_index,
            points_gained,
            total_score: game.score(),
        };
        (record, response)
    };

    if let Err(err) = backend.sessions.append_history(vec![record]).await {
        warn!(session_id = %session_id, error = %err, "solo answer not stored; rolled back");
        if let Some(mut game) = state.solo_games().get_mut(&session_id) {
            game.forget(request.question_index);
        }
        return Err(err.into());
    }

    Ok(response)
}

/// Close a solo run: store the final score and warm the result cache.
pub async fn finish(
    state: &SharedState,
    session_id: Uuid,
) -> Result<SoloFinishResponse, ServiceError> {
    state.require_backend().await?;

    let game = state
        .solo_games()
        .get(&session_id)
        .map(|game| game.clone())
        .ok_or_else(|| ServiceError::NotFound(format!("solo session {session_id}")))?;

    let final_score = game.score();
    results_service::finalize_and_cache(
        state,
        session_id,
        vec![SessionResultEntity {
            participant: game.participant.clone(),
            final_score,
            final_rank: 1,
        }],
        Vec::new(),
    )
    .await?;
    state.solo_games().remove(&session_id);
    info!(session_id = %session_id, final_score, "solo session finished");

    Ok(SoloFinishResponse {
        session_id: session_id.to_string(),
        final_score,
        correct_answers: game.correct_answers(),
        answered_questions: game.answered_questions(),
        total_questions: game.quiz.questions.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::SessionStatus,
            session_store::{SessionStore, StorageBackend, memory::MemorySessionStore},
        },
        state::{AppState, room::tests::quiz},
    };

    async fn ready_state() -> (SharedState, Arc<MemorySessionStore>) {
        let state = AppState::new(AppConfig::default());
        let (backend, store) = StorageBackend::memory();
        store.insert_quiz(quiz(2));
        state.set_backend(backend).await;
        (state, store)
    }

    fn start_request() -> SoloStartRequest {
        SoloStartRequest {
            quiz_id: "quiz-1".into(),
            user_id: None,
            nickname: Some("  Zed ".into()),
            team_id: Some("team-a".into()),
        }
    }

    fn answer_request(question_index: usize, option_index: usize, remaining_secs: f64) -> SoloAnswerRequest {
        SoloAnswerRequest {
            question_index,
            option_index,
            remaining_secs,
        }
    }

    #[tokio::test]
    async fn full_solo_run_is_scored_and_completed() {
        let (state, store) = ready_state().await;

        let started = start(&state, start_request()).await.unwrap();
        assert_eq!(started.questions.len(), 2);
        let session_id: Uuid = started.session_id.parse().unwrap();

        let hit = answer(&state, session_id, answer_request(0, 1, 10.0)).await.unwrap();
        assert!(hit.is_correct);
        assert_eq!(hit.points_gained, 67);
        assert_eq!(hit.correct_option_index, 1);

        // Client clocks are not trusted beyond the limit.
        let miss = answer(&state, session_id, answer_request(1, 0, 90.0)).await.unwrap();
        assert!(!miss.is_correct);
        assert_eq!(miss.total_score, 67);

        let done = finish(&state, session_id).await.unwrap();
        assert_eq!(done.final_score, 67);
        assert_eq!(done.correct_answers, 1);
        assert!(state.solo_games().is_empty());

        let session = store.find_session(session_id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.team_id.as_deref(), Some("team-a"));
        assert_eq!(
            session.results[0].participant,
            ParticipantRef::GuestNickname("Zed".into())
        );
        assert_eq!(store.list_history(session_id).await.unwrap().len(), 2);

        let results = results_service::load_results(&state, session_id).await.unwrap();
        assert_eq!(results.standings[0].final_rank, 1);
    }

    #[tokio::test]
    async fn second_answer_to_a_question_conflicts() {
        let (state, _store) = ready_state().await;
        let started = start(&state, start_request()).await.unwrap();
        let session_id: Uuid = started.session_id.parse().unwrap();

        answer(&state, session_id, answer_request(0, 1, 30.0)).await.unwrap();
        assert!(matches!(
            answer(&state, session_id, answer_request(0, 2, 30.0)).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert!(matches!(
            answer(&state, session_id, answer_request(5, 0, 30.0)).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn unknown_quiz_and_session_are_not_found() {
        let (state, _store) = ready_state().await;
        let mut request = start_request();
        request.quiz_id = "missing".into();
        assert!(matches!(
            start(&state, request).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            finish(&state, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
