use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Numeric, human-typeable room code.
pub type JoinCode = u32;

/// Lifecycle status of a persisted game session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Room created, game not started.
    Waiting,
    /// Questions are being played.
    InProgress,
    /// Final results were stored.
    Completed,
    /// Torn down before completion (host loss or explicit close).
    Cancelled,
}

/// How a session is played.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Live room with a host and pushed state.
    Multiplayer,
    /// Single player, request/response.
    Solo,
}

/// Identity under which a participant is recorded durably.
///
/// Serialised as either `{"userId": ..}` or `{"guestNickname": ..}` so it can be
/// flattened into the owning record.
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum ParticipantRef {
    /// Registered user.
    UserId(String),
    /// Anonymous player known only by the nickname they typed.
    GuestNickname(String),
}

impl ParticipantRef {
    /// Stable key used to build storage identifiers.
    pub fn storage_key(&self) -> String {
        match self {
            ParticipantRef::UserId(id) => format!("user:{id}"),
            ParticipantRef::GuestNickname(name) => format!("guest:{name}"),
        }
    }
}

/// Final standing of one participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionResultEntity {
    #[serde(flatten)]
    pub participant: ParticipantRef,
    pub final_score: u32,
    pub final_rank: u32,
}

/// Post-game rating left by a participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntity {
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    pub submitted_at: SystemTime,
}

/// Durable record of a game session; outlives the live room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntity {
    pub id: Uuid,
    pub quiz_id: String,
    #[serde(default)]
    pub host_id: Option<String>,
    #[serde(default)]
    pub join_code: Option<JoinCode>,
    pub status: SessionStatus,
    pub mode: SessionMode,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub results: Vec<SessionResultEntity>,
    #[serde(default)]
    pub feedback: Vec<FeedbackEntity>,
    /// Question indices whose history could not be stored.
    #[serde(default)]
    pub incomplete_questions: Vec<usize>,
    pub created_at: SystemTime,
    #[serde(default)]
    pub started_at: Option<SystemTime>,
    #[serde(default)]
    pub ended_at: Option<SystemTime>,
}

impl SessionEntity {
    /// Fresh multiplayer session in the `waiting` state.
    pub fn multiplayer(
        id: Uuid,
        quiz_id: String,
        host_id: String,
        join_code: JoinCode,
        team_id: Option<String>,
    ) -> Self {
        Self {
            id,
            quiz_id,
            host_id: Some(host_id),
            join_code: Some(join_code),
            status: SessionStatus::Waiting,
            mode: SessionMode::Multiplayer,
            team_id,
            results: Vec::new(),
            feedback: Vec::new(),
            incomplete_questions: Vec::new(),
            created_at: SystemTime::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Fresh solo session, already in progress.
    pub fn solo(id: Uuid, quiz_id: String, team_id: Option<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            quiz_id,
            host_id: None,
            join_code: None,
            status: SessionStatus::InProgress,
            mode: SessionMode::Solo,
            team_id,
            results: Vec::new(),
            feedback: Vec::new(),
            incomplete_questions: Vec::new(),
            created_at: now,
            started_at: Some(now),
            ended_at: None,
        }
    }
}

/// Values written when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFinalization {
    pub status: SessionStatus,
    pub results: Vec<SessionResultEntity>,
    pub incomplete_questions: Vec<usize>,
    pub ended_at: SystemTime,
}

/// One submission inside a history record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttemptEntity {
    pub selected_option_id: String,
    pub is_correct: bool,
    pub answer_time_ms: u64,
}

/// Per-question, per-participant answer history; source of truth for analytics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntity {
    pub game_session_id: Uuid,
    pub quiz_id: String,
    pub question_id: String,
    /// Position of the question in the quiz; orders reports.
    #[serde(default)]
    pub question_index: usize,
    #[serde(flatten)]
    pub participant: ParticipantRef,
    pub attempts: Vec<AttemptEntity>,
    pub is_ultimately_correct: bool,
    pub final_score_gained: u32,
}

impl HistoryEntity {
    /// Identifier that makes history writes idempotent across retries.
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.game_session_id,
            self.question_id,
            self.participant.storage_key()
        )
    }
}

/// Quiz content as provided by the authoring side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuizEntity {
    pub id: String,
    pub title: String,
    pub questions: Vec<QuestionEntity>,
}

/// A single multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEntity {
    pub id: String,
    pub text: String,
    pub time_limit_secs: u32,
    pub points: u32,
    pub options: Vec<QuestionOptionEntity>,
}

/// Answer option of a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOptionEntity {
    pub id: String,
    pub text: String,
    pub is_correct: bool,
}
