use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dao::models::{AttemptEntity, ParticipantRef, SessionMode, SessionStatus};

/// Final results of a session: standings joined with per-question history.
///
/// This is the payload stored in the result cache, so it round-trips through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResults {
    pub session_id: String,
    pub quiz_id: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    /// RFC 3339.
    pub started_at: Option<String>,
    /// RFC 3339.
    pub ended_at: Option<String>,
    pub standings: Vec<StandingView>,
    pub questions: Vec<QuestionBreakdown>,
    /// Questions whose answers could not be stored; their breakdown is partial.
    pub incomplete_questions: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StandingView {
    #[serde(flatten)]
    pub participant: ParticipantRef,
    pub final_score: u32,
    pub final_rank: u32,
    pub correct_answers: u32,
    pub answered_questions: u32,
}

/// How the room answered one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBreakdown {
    pub question_id: String,
    pub respondents: u32,
    pub correct_count: u32,
    pub answers: Vec<ParticipantAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantAnswer {
    #[serde(flatten)]
    pub participant: ParticipantRef,
    pub attempts: Vec<AttemptEntity>,
    pub is_ultimately_correct: bool,
    pub final_score_gained: u32,
}
