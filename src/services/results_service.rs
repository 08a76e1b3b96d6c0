use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        cache::results_key,
        models::{
            HistoryEntity, ParticipantRef, SessionEntity, SessionFinalization,
            SessionResultEntity, SessionStatus,
        },
        session_store::StorageBackend,
    },
    dto::{
        format_system_time,
        results::{ParticipantAnswer, QuestionBreakdown, SessionResults, StandingView},
    },
    error::ServiceError,
    state::{SharedState, room::Standing},
};

/// Join a finished session with its answer history.
///
/// Questions appear in quiz order whatever order the backend returned the
/// records in. Standings keep the stored ranks; per-player answer tallies come
/// from the history.
pub fn assemble(session: &SessionEntity, history: &[HistoryEntity]) -> SessionResults {
    let mut ordered: Vec<&HistoryEntity> = history.iter().collect();
    ordered.sort_by(|a, b| {
        (a.question_index, &a.participant).cmp(&(b.question_index, &b.participant))
    });

    let mut questions: IndexMap<&str, QuestionBreakdown> = IndexMap::new();
    let mut tallies: HashMap<&ParticipantRef, (u32, u32)> = HashMap::new();

    for record in ordered {
        let breakdown = questions
            .entry(record.question_id.as_str())
            .or_insert_with(|| QuestionBreakdown {
                question_id: record.question_id.clone(),
                respondents: 0,
                correct_count: 0,
                answers: Vec::new(),
            });

        let answered = !record.attempts.is_empty();
        if answered {
            breakdown.respondents += 1;
        }
        if record.is_ultimately_correct {
            breakdown.correct_count += 1;
        }
        breakdown.answers.push(ParticipantAnswer {
            participant: record.participant.clone(),
            attempts: record.attempts.clone(),
            is_ultimately_correct: record.is_ultimately_correct,
            final_score_gained: record.final_score_gained,
        });

        let tally = tallies.entry(&record.participant).or_default();
        tally.0 += u32::from(record.is_ultimately_correct);
        tally.1 += u32::from(answered);
    }

    let mut standings: Vec<StandingView> = session
        .results
        .iter()
        .map(|result| {
            let (correct_answers, answered_questions) =
                tallies.get(&result.participant).copied().unwrap_or_default();
            StandingView {
                participant: result.participant.clone(),
                final_score: result.final_score,
                final_rank: result.final_rank,
                correct_answers,
                answered_questions,
            }
        })
        .collect();
    standings.sort_by_key(|standing| standing.final_rank);

    SessionResults {
        session_id: session.id.to_string(),
        quiz_id: session.quiz_id.clone(),
        mode: session.mode,
        status: session.status,
        started_at: session.started_at.map(format_system_time),
        ended_at: session.ended_at.map(format_system_time),
        standings,
        questions: questions.into_values().collect(),
        incomplete_questions: session.incomplete_questions.clone(),
    }
}

/// Convert live standings into the persisted result rows.
pub fn result_rows(standings: &[Standing]) -> Vec<SessionResultEntity> {
    standings
        .iter()
        .map(|standing| SessionResultEntity {
            participant: standing.participant.clone(),
            final_score: standing.score,
            final_rank: standing.rank,
        })
        .collect()
}

/// Mark a session completed with its standings, then warm the result cache.
pub async fn finalize_and_cache(
    state: &SharedState,
    session_id: Uuid,
    results: Vec<SessionResultEntity>,
    incomplete_questions: Vec<usize>,
) -> Result<(), ServiceError> {
    let backend = state.backend().await.ok_or(ServiceError::Degraded)?;
    backend
        .sessions
        .finalize_session(
            session_id,
            SessionFinalization {
                status: SessionStatus::Completed,
                results,
                incomplete_questions,
                ended_at: std::time::SystemTime::now(),
            },
        )
        .await?;
    info!(session_id = %session_id, "session finalized");

    let payload = recompute(&backend, session_id).await?;
    store_in_cache(state, &backend, session_id, &payload).await;
    Ok(())
}

/// Results of a completed session, from the cache when possible.
pub async fn load_results(
    state: &SharedState,
    session_id: Uuid,
) -> Result<SessionResults, ServiceError> {
    let backend = state.require_backend().await?;

    match backend.cache.get(results_key(session_id)).await {
        Ok(Some(value)) => match serde_json::from_value::<SessionResults>(value) {
            Ok(payload) => {
                debug!(session_id = %session_id, "results served from cache");
                return Ok(payload);
            }
            Err(err) => warn!(session_id = %session_id, error = %err, "cached results unreadable"),
        },
        Ok(None) => {}
        Err(err) => warn!(session_id = %session_id, error = %err, "result cache lookup failed"),
    }

    let payload = recompute(&backend, session_id).await?;
    store_in_cache(state, &backend, session_id, &payload).await;
    Ok(payload)
}

async fn recompute(
    backend: &StorageBackend,
    session_id: Uuid,
) -> Result<SessionResults, ServiceError> {
    let session = backend
        .sessions
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session {session_id}")))?;
    if session.status != SessionStatus::Completed {
        return Err(ServiceError::InvalidState(
            "session has not finished yet".into(),
        ));
    }
    let history = backend.sessions.list_history(session_id).await?;
    Ok(assemble(&session, &history))
}

async fn store_in_cache(
    state: &SharedState,
    backend: &StorageBackend,
    session_id: Uuid,
    payload: &SessionResults,
) {
    let value = match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(err) => {
            warn!(session_id = %session_id, error = %err, "failed to encode results");
            return;
        }
    };
    if let Err(err) = backend
        .cache
        .put(results_key(session_id), value, state.config().result_cache_ttl)
        .await
    {
        warn!(session_id = %session_id, error = %err, "failed to cache results");
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{AttemptEntity, SessionMode},
            session_store::SessionStore,
        },
        state::AppState,
    };

    fn record(session: Uuid, question: &str, user: &str, correct: bool, points: u32) -> HistoryEntity {
        HistoryEntity {
            game_session_id: session,
            quiz_id: "quiz".into(),
            question_id: question.into(),
            question_index: question.trim_start_matches('q').parse().unwrap_or_default(),
            participant: ParticipantRef::UserId(user.into()),
            attempts: vec![AttemptEntity {
                selected_option_id: format!("{question}-a"),
                is_correct: correct,
                answer_time_ms: 4_000,
            }],
            is_ultimately_correct: correct,
            final_score_gained: points,
        }
    }

    fn completed_session(id: Uuid) -> SessionEntity {
        let mut session = SessionEntity::multiplayer(id, "quiz".into(), "host".into(), 123456, None);
        session.status = SessionStatus::Completed;
        session.ended_at = Some(SystemTime::now());
        session.results = vec![
            SessionResultEntity {
                participant: ParticipantRef::UserId("u2".into()),
                final_score: 90,
                final_rank: 2,
            },
            SessionResultEntity {
                participant: ParticipantRef::UserId("u1".into()),
                final_score: 150,
                final_rank: 1,
            },
        ];
        session
    }

    #[test]
    fn assembly_groups_history_by_question() {
        let id = Uuid::new_v4();
        let mut silent = record(id, "q1", "u2", false, 0);
        silent.attempts.clear();
        let history = vec![
            record(id, "q0", "u1", true, 80),
            record(id, "q0", "u2", true, 90),
            record(id, "q1", "u1", true, 70),
            silent,
        ];

        let results = assemble(&completed_session(id), &history);

        assert_eq!(results.mode, SessionMode::Multiplayer);
        assert_eq!(results.questions.len(), 2);
        assert_eq!(results.questions[0].question_id, "q0");
        assert_eq!(results.questions[0].correct_count, 2);
        assert_eq!(results.questions[1].respondents, 1);
        assert_eq!(results.questions[1].answers.len(), 2);

        let first = &results.standings[0];
        assert_eq!(first.participant, ParticipantRef::UserId("u1".into()));
        assert_eq!(first.final_rank, 1);
        assert_eq!(first.correct_answers, 2);
        assert_eq!(results.standings[1].answered_questions, 1);
    }

    #[test]
    fn questions_follow_quiz_order_not_storage_order() {
        let id = Uuid::new_v4();
        // Lexicographic id order, as a document store lists them.
        let history = vec![
            record(id, "q10", "u1", true, 50),
            record(id, "q2", "u2", false, 0),
            record(id, "q2", "u1", true, 60),
            record(id, "q0", "u1", true, 70),
        ];

        let results = assemble(&completed_session(id), &history);

        let order: Vec<&str> = results
            .questions
            .iter()
            .map(|question| question.question_id.as_str())
            .collect();
        assert_eq!(order, ["q0", "q2", "q10"]);
        assert_eq!(
            results.questions[1].answers[0].participant,
            ParticipantRef::UserId("u1".into())
        );
    }

    #[tokio::test]
    async fn results_are_recomputed_once_then_served_from_cache() {
        let state = AppState::new(AppConfig::default());
        let (backend, store) = StorageBackend::memory();
        state.set_backend(backend.clone()).await;

        let id = Uuid::new_v4();
        backend
            .sessions
            .create_session(completed_session(id))
            .await
            .unwrap();
        store
            .append_history(vec![record(id, "q0", "u1", true, 150)])
            .await
            .unwrap();

        let fresh = load_results(&state, id).await.unwrap();
        assert!(backend.cache.get(results_key(id)).await.unwrap().is_some());

        // A later history write is not visible until the cache entry expires.
        store
            .append_history(vec![record(id, "q1", "u1", true, 10)])
            .await
            .unwrap();
        let cached = load_results(&state, id).await.unwrap();
        assert_eq!(cached, fresh);
        assert_eq!(cached.questions.len(), 1);
    }

    #[tokio::test]
    async fn unfinished_or_unknown_sessions_are_rejected() {
        let state = AppState::new(AppConfig::default());
        let (backend, _store) = StorageBackend::memory();
        state.set_backend(backend.clone()).await;

        assert!(matches!(
            load_results(&state, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));

        let id = Uuid::new_v4();
        backend
            .sessions
            .create_session(SessionEntity::multiplayer(
                id,
                "quiz".into(),
                "host".into(),
                1111,
                None,
            ))
            .await
            .unwrap();
        assert!(matches!(
            load_results(&state, id).await,
            Err(ServiceError::InvalidState(_))
        ));
    }
}
