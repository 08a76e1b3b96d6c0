use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::JoinCode,
    dto::{
        epoch_millis,
        validation::{validate_display_name, validate_identifier, validate_join_code},
    },
    state::{
        room::{Role, Room, RoomSettings, SettingsPatch},
        state_machine::RoomPhase,
    },
};

/// Events accepted from quiz clients over the `/ws` socket.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        quiz_id: String,
        host_id: String,
        host_name: String,
        #[serde(default)]
        settings: SettingsPatch,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: u32,
        user_id: String,
        username: String,
        #[serde(default)]
        guest: bool,
    },
    #[serde(rename_all = "camelCase")]
    StartGame { room_id: u32 },
    #[serde(rename_all = "camelCase")]
    SubmitAnswer {
        room_id: u32,
        #[serde(default)]
        user_id: Option<String>,
        option_index: usize,
    },
    #[serde(rename_all = "camelCase")]
    RequestNextQuestion { room_id: u32 },
    #[serde(rename_all = "camelCase")]
    UpdateSettings {
        room_id: u32,
        settings: SettingsPatch,
    },
    #[serde(rename_all = "camelCase")]
    PlayAgain { room_id: u32 },
    #[serde(rename_all = "camelCase")]
    CloseRoom { room_id: u32 },
}

/// Why an inbound frame was refused before dispatch.
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
}

impl ClientMessage {
    /// Parse a text frame and validate its fields.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    /// Room addressed by the event; `None` for `create-room`.
    pub fn room_id(&self) -> Option<JoinCode> {
        match self {
            Self::CreateRoom { .. } => None,
            Self::JoinRoom { room_id, .. }
            | Self::StartGame { room_id }
            | Self::SubmitAnswer { room_id, .. }
            | Self::RequestNextQuestion { room_id }
            | Self::UpdateSettings { room_id, .. }
            | Self::PlayAgain { room_id }
            | Self::CloseRoom { room_id } => Some(*room_id),
        }
    }
}

impl Validate for ClientMessage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match self {
            Self::CreateRoom {
                quiz_id,
                host_id,
                host_name,
                ..
            } => {
                if let Err(e) = validate_identifier(quiz_id) {
                    errors.add("quizId", e);
                }
                if let Err(e) = validate_identifier(host_id) {
                    errors.add("hostId", e);
                }
                if let Err(e) = validate_display_name(host_name) {
                    errors.add("hostName", e);
                }
            }
            Self::JoinRoom {
                user_id, username, ..
            } => {
                if let Err(e) = validate_identifier(user_id) {
                    errors.add("userId", e);
                }
                if let Err(e) = validate_display_name(username) {
                    errors.add("username", e);
                }
            }
            Self::SubmitAnswer {
                user_id: Some(user_id),
                ..
            } => {
                if let Err(e) = validate_identifier(user_id) {
                    errors.add("userId", e);
                }
            }
            _ => {}
        }

        if let Some(room_id) = self.room_id() {
            if let Err(e) = validate_join_code(room_id) {
                errors.add("roomId", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Why a room stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    HostDisconnected,
    ClosedByHost,
}

impl CloseReason {
    pub fn message(self) -> &'static str {
        match self {
            CloseReason::HostDisconnected => "The host disconnected. The game has ended.",
            CloseReason::ClosedByHost => "The host closed the room.",
        }
    }
}

/// Frames pushed to quiz clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Personalized room snapshot.
    RoomState(RoomStateView),
    /// A request from this connection was rejected.
    Error { message: String },
    /// Host-only notice that durable storage is lagging behind the game.
    Warning { message: String },
    /// Answer this user already gave for the open question, sent after a rejoin.
    #[serde(rename_all = "camelCase")]
    PreviousAnswer {
        question_index: usize,
        option_index: usize,
    },
    /// The room is gone; no further frames follow for it.
    RoomClosed { reason: CloseReason, message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    pub fn closed(reason: CloseReason) -> Self {
        Self::RoomClosed {
            reason,
            message: reason.message().into(),
        }
    }
}

/// Participant as seen by other members of the room.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub user_id: String,
    pub display_name: String,
    pub is_online: bool,
    pub score: u32,
    pub role: Role,
    pub has_answered: bool,
    pub guest: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OptionView {
    pub id: String,
    pub text: String,
}

/// Question payload; correctness is only present once the round is settled.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    /// Seconds.
    pub time_limit: u32,
    pub points: u32,
    pub options: Vec<OptionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_option_index: Option<usize>,
}

/// The recipient's own outcome for the settled round.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct YourAnswerView {
    pub option_index: Option<usize>,
    pub is_correct: bool,
    pub points_gained: u32,
}

/// State snapshot built for one recipient.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateView {
    pub session_id: String,
    pub room_id: u32,
    pub game_state: RoomPhase,
    pub participants: Vec<ParticipantView>,
    /// `-1` before the first question.
    pub current_question_index: i64,
    pub total_questions: usize,
    pub settings: RoomSettings,
    /// Epoch milliseconds.
    pub question_start_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_counts: Option<Vec<u32>>,
    pub your_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_answer: Option<YourAnswerView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoomStateView {
    /// Build the snapshot `user_id` is allowed to see.
    ///
    /// The host gets live answer counts while a question is open, everybody
    /// gets the final counts and the correct option in `results`, and only the
    /// recipient sees their own round outcome.
    pub fn for_recipient(room: &Room, user_id: &str, error: Option<String>) -> Self {
        let phase = room.phase();
        let is_host = room
            .participant(user_id)
            .is_some_and(|p| p.role == Role::Host);
        let in_round = matches!(phase, RoomPhase::Question | RoomPhase::Results);

        let answer_counts = match phase {
            RoomPhase::Question if is_host => Some(live_counts(room)),
            RoomPhase::Results => Some(room.answer_counts().to_vec()),
            _ => None,
        };

        let question = room
            .current_question()
            .filter(|_| in_round)
            .map(|question| QuestionView {
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
                correct_option_index: (phase == RoomPhase::Results)
                    .then(|| question.options.iter().position(|o| o.is_correct))
                    .flatten(),
            });

        let your_answer = (phase == RoomPhase::Results)
            .then(|| room.round_outcome(user_id))
            .flatten()
            .map(|outcome| YourAnswerView {
                option_index: outcome.option_index,
                is_correct: outcome.is_correct,
                points_gained: outcome.points_gained,
            });

        Self {
            session_id: room.session_id().to_string(),
            room_id: room.join_code(),
            game_state: phase,
            participants: room
                .participants()
                .map(|p| ParticipantView {
                    user_id: p.user_id.clone(),
                    display_name: p.display_name.clone(),
                    is_online: p.is_online,
                    score: p.score,
                    role: p.role,
                    has_answered: p.has_answered,
                    guest: p.guest,
                })
                .collect(),
            current_question_index: room
                .current_question_index()
                .map_or(-1, |index| index as i64),
            total_questions: room.total_questions(),
            settings: room.settings(),
            question_start_time: room
                .question_started_at()
                .filter(|_| in_round)
                .map(epoch_millis),
            answer_counts,
            your_user_id: user_id.to_owned(),
            question,
            your_answer,
            error,
        }
    }
}

/// Tally of the latest answer of every player for the open question.
fn live_counts(room: &Room) -> Vec<u32> {
    let options = room.current_question().map_or(0, |q| q.options.len());
    let mut counts = vec![0; options];
    for participant in room.participants() {
        if let Some(answer) = room.answers_of(&participant.user_id).last() {
            if let Some(slot) = counts.get_mut(answer.option_index) {
                *slot += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use serde_json::{Value, json};
    use uuid::Uuid;

    use super::*;
    use crate::state::room::{HostSeat, tests::quiz};

    fn room_with_answer() -> Room {
        let mut room = Room::new(
            123456,
            Uuid::nil(),
            "quiz-1".into(),
            HostSeat {
                connection_id: Uuid::from_u128(1),
                user_id: "host".into(),
                display_name: "Host".into(),
            },
            RoomSettings::default(),
            None,
            50,
        );
        room.join(Uuid::from_u128(2), "u1", "Ann", false).unwrap();
        room.join(Uuid::from_u128(3), "u2", "Bob", false).unwrap();
        let plan = room.plan_start(Uuid::from_u128(1)).unwrap();
        room.apply_start(plan, quiz(2), SystemTime::now()).unwrap();
        room.submit_answer(Uuid::from_u128(2), None, 1, 10.0).unwrap();
        room
    }

    fn to_json(view: RoomStateView) -> Value {
        serde_json::to_value(ServerMessage::RoomState(view)).unwrap()
    }

    #[test]
    fn parses_kebab_case_events() {
        let message = ClientMessage::from_json_str(
            r#"{"type":"submit-answer","roomId":123456,"userId":"u1","optionIndex":2}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            ClientMessage::SubmitAnswer {
                room_id: 123456,
                user_id: Some("u1".into()),
                option_index: 2,
            }
        );

        let create = ClientMessage::from_json_str(
            r#"{"type":"create-room","quizId":"q","hostId":"h","hostName":"Hank"}"#,
        )
        .unwrap();
        assert!(matches!(
            create,
            ClientMessage::CreateRoom { settings, .. } if settings == SettingsPatch::default()
        ));
    }

    #[test]
    fn rejects_unknown_and_invalid_events() {
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"type":"buzz","roomId":1}"#),
            Err(InboundError::Malformed(_))
        ));
        assert!(matches!(
            ClientMessage::from_json_str(
                r#"{"type":"join-room","roomId":1,"userId":"  ","username":"Ann"}"#
            ),
            Err(InboundError::Invalid(_))
        ));
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"type":"start-game","roomId":0}"#),
            Err(InboundError::Invalid(_))
        ));
    }

    #[test]
    fn question_hides_correctness_and_counts_from_players() {
        let room = room_with_answer();

        let player = to_json(RoomStateView::for_recipient(&room, "u2", None));
        assert_eq!(player["type"], "room-state");
        assert_eq!(player["gameState"], "question");
        assert_eq!(player["currentQuestionIndex"], 0);
        assert_eq!(player["yourUserId"], "u2");
        assert!(player["question"].get("correctOptionIndex").is_none());
        assert!(player.get("answerCounts").is_none());
        assert!(player.get("yourAnswer").is_none());
        assert!(player["participants"][0].get("connectionId").is_none());

        let host = to_json(RoomStateView::for_recipient(&room, "host", None));
        assert_eq!(host["answerCounts"], json!([0, 1, 0, 0]));
    }

    #[test]
    fn results_reveal_only_the_recipients_outcome() {
        let mut room = room_with_answer();
        room.settle().unwrap();

        let ann = to_json(RoomStateView::for_recipient(&room, "u1", None));
        assert_eq!(ann["question"]["correctOptionIndex"], 1);
        assert_eq!(ann["yourAnswer"]["isCorrect"], true);
        assert_eq!(ann["yourAnswer"]["pointsGained"], 67);
        assert_eq!(ann["answerCounts"], json!([0, 1, 0, 0]));

        let bob = to_json(RoomStateView::for_recipient(&room, "u2", None));
        assert_eq!(bob["yourAnswer"]["isCorrect"], false);
        assert_eq!(bob["yourAnswer"]["optionIndex"], Value::Null);

        let host = to_json(RoomStateView::for_recipient(&room, "host", None));
        assert!(host.get("yourAnswer").is_none());
    }

    #[test]
    fn lobby_snapshot_has_no_question() {
        let room = Room::new(
            1,
            Uuid::nil(),
            "quiz".into(),
            HostSeat {
                connection_id: Uuid::from_u128(1),
                user_id: "host".into(),
                display_name: "Host".into(),
            },
            RoomSettings::default(),
            None,
            50,
        );
        let view = to_json(RoomStateView::for_recipient(
            &room,
            "host",
            Some("quiz `quiz` has no questions".into()),
        ));
        assert_eq!(view["currentQuestionIndex"], -1);
        assert_eq!(view["questionStartTime"], Value::Null);
        assert!(view.get("question").is_none());
        assert_eq!(view["error"], "quiz `quiz` has no questions");
    }

    #[test]
    fn closing_frame_carries_reason() {
        let frame = serde_json::to_value(ServerMessage::closed(CloseReason::HostDisconnected))
            .unwrap();
        assert_eq!(frame["type"], "room-closed");
        assert_eq!(frame["reason"], "host-disconnected");
    }
}
