use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::QuizEntity,
    dto::{
        validation::{validate_display_name, validate_identifier},
        ws::OptionView,
    },
};

/// Start a single-player run of a quiz.
///
/// Registered users send `userId`; anonymous players send a `nickname`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SoloStartRequest {
    pub quiz_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
}

impl Validate for SoloStartRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_identifier(&self.quiz_id) {
            errors.add("quizId", e);
        }
        match (&self.user_id, &self.nickname) {
            (Some(user_id), _) => {
                if let Err(e) = validate_identifier(user_id) {
                    errors.add("userId", e);
                }
            }
            (None, Some(nickname)) => {
                if let Err(e) = validate_display_name(nickname) {
                    errors.add("nickname", e);
                }
            }
            (None, None) => {
                let mut err = ValidationError::new("identity_missing");
                err.message = Some("Either userId or nickname is required".into());
                errors.add("userId", err);
            }
        }
        if let Some(team_id) = &self.team_id {
            if let Err(e) = validate_identifier(team_id) {
                errors.add("teamId", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Question as served to a solo player; correctness stays on the server.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SoloQuestionView {
    pub index: usize,
    pub id: String,
    pub text: String,
    pub time_limit: u32,
    pub points: u32,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SoloStartResponse {
    pub session_id: String,
    pub quiz_id: String,
    pub title: String,
    pub questions: Vec<SoloQuestionView>,
}

impl SoloStartResponse {
    pub fn new(session_id: String, quiz: &QuizEntity) -> Self {
        Self {
            session_id,
            quiz_id: quiz.id.clone(),
            title: quiz.title.clone(),
            questions: quiz
                .questions
                .iter()
                .enumerate()
                .map(|(index, question)| SoloQuestionView {
                    index,
                    id: question.id.clone(),
                    text: question.text.clone(),
                    time_limit: question.time_limit_secs,
                    points: question.points,
                    options: question
                        .options
                        .iter()
                        .map(|option| OptionView {
                            id: option.id.clone(),
                            text: option.text.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SoloAnswerRequest {
    pub question_index: usize,
    pub option_index: usize,
    /// Seconds left on the client's timer; clamped to the question's limit.
    #[validate(range(min = 0.0))]
    pub remaining_secs: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SoloAnswerResponse {
    pub question_index: usize,
    pub is_correct: bool,
    pub correct_option_index: usize,
    pub points_gained: u32,
    pub total_score: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SoloFinishResponse {
    pub session_id: String,
    pub final_score: u32,
    pub correct_answers: u32,
    pub answered_questions: usize,
    pub total_questions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(user_id: Option<&str>, nickname: Option<&str>) -> SoloStartRequest {
        SoloStartRequest {
            quiz_id: "quiz-1".into(),
            user_id: user_id.map(Into::into),
            nickname: nickname.map(Into::into),
            team_id: None,
        }
    }

    #[test]
    fn start_requires_an_identity() {
        assert!(request(Some("u1"), None).validate().is_ok());
        assert!(request(None, Some("Zed")).validate().is_ok());
        assert!(request(None, None).validate().is_err());
        assert!(request(None, Some(" ")).validate().is_err());
    }

    #[test]
    fn negative_remaining_time_is_rejected() {
        let answer = SoloAnswerRequest {
            question_index: 0,
            option_index: 1,
            remaining_secs: -1.0,
        };
        assert!(answer.validate().is_err());
    }
}
