use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{
    AttemptEntity, FeedbackEntity, HistoryEntity, JoinCode, ParticipantRef, QuestionEntity,
    QuizEntity, SessionEntity, SessionMode, SessionResultEntity, SessionStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: String,
    quiz_id: String,
    host_id: Option<String>,
    join_code: Option<JoinCode>,
    status: SessionStatus,
    mode: SessionMode,
    team_id: Option<String>,
    #[serde(default)]
    results: Vec<SessionResultEntity>,
    #[serde(default)]
    feedback: Vec<FeedbackEntity>,
    #[serde(default)]
    incomplete_questions: Vec<usize>,
    created_at: DateTime,
    started_at: Option<DateTime>,
    ended_at: Option<DateTime>,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            quiz_id: value.quiz_id,
            host_id: value.host_id,
            join_code: value.join_code,
            status: value.status,
            mode: value.mode,
            team_id: value.team_id,
            results: value.results,
            feedback: value.feedback,
            incomplete_questions: value.incomplete_questions,
            created_at: DateTime::from_system_time(value.created_at),
            started_at: value.started_at.map(DateTime::from_system_time),
            ended_at: value.ended_at.map(DateTime::from_system_time),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id)
            .map_err(|_| MongoDaoError::corrupt(value.id.clone(), "session id is not a UUID"))?;
        Ok(Self {
            id,
            quiz_id: value.quiz_id,
            host_id: value.host_id,
            join_code: value.join_code,
            status: value.status,
            mode: value.mode,
            team_id: value.team_id,
            results: value.results,
            feedback: value.feedback,
            incomplete_questions: value.incomplete_questions,
            created_at: value.created_at.to_system_time(),
            started_at: value.started_at.map(|at| at.to_system_time()),
            ended_at: value.ended_at.map(|at| at.to_system_time()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoHistoryDocument {
    #[serde(rename = "_id")]
    id: String,
    game_session_id: String,
    quiz_id: String,
    question_id: String,
    #[serde(default)]
    question_index: usize,
    #[serde(flatten)]
    participant: ParticipantRef,
    attempts: Vec<AttemptEntity>,
    is_ultimately_correct: bool,
    final_score_gained: u32,
}

impl MongoHistoryDocument {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl From<HistoryEntity> for MongoHistoryDocument {
    fn from(value: HistoryEntity) -> Self {
        Self {
            id: value.storage_key(),
            game_session_id: value.game_session_id.to_string(),
            quiz_id: value.quiz_id,
            question_id: value.question_id,
            question_index: value.question_index,
            participant: value.participant,
            attempts: value.attempts,
            is_ultimately_correct: value.is_ultimately_correct,
            final_score_gained: value.final_score_gained,
        }
    }
}

impl TryFrom<MongoHistoryDocument> for HistoryEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoHistoryDocument) -> Result<Self, Self::Error> {
        let game_session_id = Uuid::parse_str(&value.game_session_id)
            .map_err(|_| MongoDaoError::corrupt(value.id.clone(), "session id is not a UUID"))?;
        Ok(Self {
            game_session_id,
            quiz_id: value.quiz_id,
            question_id: value.question_id,
            question_index: value.question_index,
            participant: value.participant,
            attempts: value.attempts,
            is_ultimately_correct: value.is_ultimately_correct,
            final_score_gained: value.final_score_gained,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuizDocument {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    questions: Vec<QuestionEntity>,
}

impl From<MongoQuizDocument> for QuizEntity {
    fn from(value: MongoQuizDocument) -> Self {
        Self {
            id: value.id,
            title: value.title,
            questions: value.questions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoCacheDocument {
    #[serde(rename = "_id")]
    pub key: String,
    /// JSON text of the cached value.
    pub payload: String,
    pub expires_at: DateTime,
}

pub fn doc_id(id: impl Into<String>) -> Document {
    doc! {"_id": id.into()}
}
