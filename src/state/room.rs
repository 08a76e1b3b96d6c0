use std::{collections::HashMap, time::SystemTime};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dao::models::{
        AttemptEntity, HistoryEntity, JoinCode, ParticipantRef, QuestionEntity, QuizEntity,
    },
    services::scoring::score,
    state::{
        connections::ConnectionId,
        state_machine::{ApplyError, PlanError, PlanId, RoomEvent, RoomPhase, RoomStateMachine},
    },
};

/// Role of a participant inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Player,
}

/// A member of a room. Keyed by `user_id`, which survives reconnects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Current transport connection; `None` while offline.
    pub connection_id: Option<ConnectionId>,
    /// Client-chosen id, stable across reconnects.
    pub user_id: String,
    /// Name shown to the room; a guest's durable identity.
    pub display_name: String,
    /// Whether a connection is attached.
    pub is_online: bool,
    /// Points accumulated in the current game.
    pub score: u32,
    /// Host or player.
    pub role: Role,
    /// Answered the open question.
    pub has_answered: bool,
    /// Recorded by nickname instead of user id.
    #[serde(default)]
    pub guest: bool,
}

impl Participant {
    /// Identity used in durable records.
    pub fn participant_ref(&self) -> ParticipantRef {
        if self.guest {
            ParticipantRef::GuestNickname(self.display_name.clone())
        } else {
            ParticipantRef::UserId(self.user_id.clone())
        }
    }
}

/// One submission for the current question. Correctness stays unknown until settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub option_index: usize,
    pub remaining_secs: f64,
    pub is_correct: Option<bool>,
}

/// Host-controlled room behaviour.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    /// Advance to the next question automatically after a short delay.
    pub auto_next: bool,
    /// Let players change their answer until the round settles.
    pub allow_answer_change: bool,
}

/// Partial settings update sent by the host.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default)]
    pub auto_next: Option<bool>,
    #[serde(default)]
    pub allow_answer_change: Option<bool>,
}

impl RoomSettings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(auto_next) = patch.auto_next {
            self.auto_next = auto_next;
        }
        if let Some(allow) = patch.allow_answer_change {
            self.allow_answer_change = allow;
        }
    }
}

/// What one player got out of the last settled round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundOutcome {
    pub option_index: Option<usize>,
    pub is_correct: bool,
    pub points_gained: u32,
}

/// Client protocol and content errors raised by room logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// No live or cached room behind the join code.
    #[error("room not found")]
    NotFound,
    /// The game finished; the room only serves its results screen.
    #[error("the game in this room has already ended")]
    Ended,
    /// Join rejected because every seat is taken.
    #[error("room is full ({capacity} participants)")]
    Full {
        /// Seats in the room, host included.
        capacity: usize,
    },
    /// Another guest in the room already plays under this nickname.
    #[error("nickname `{nickname}` is already taken in this room")]
    NicknameTaken {
        /// Nickname that was requested.
        nickname: String,
    },
    /// Host-only action sent by a player.
    #[error("only the host can do that")]
    NotHost,
    /// The host tried to submit an answer.
    #[error("the host cannot answer questions")]
    HostCannotAnswer,
    /// The connection is not a member of the targeted room.
    #[error("this connection has not joined the room")]
    NotInRoom,
    /// The `userId` in the event belongs to someone else.
    #[error("user id does not match this connection")]
    IdentityMismatch,
    /// Event not valid in the current phase.
    #[error("not allowed while the room is in {actual:?}")]
    WrongPhase {
        /// Phase the room was in when the event arrived.
        actual: RoomPhase,
    },
    /// Second answer while answer changes are off.
    #[error("answer already locked in")]
    AnswerLocked,
    /// Option index outside the open question.
    #[error("option {option_index} does not exist")]
    InvalidOption {
        /// Index the client sent.
        option_index: usize,
    },
    /// Start requested with no online player.
    #[error("at least one connected player is required")]
    NoPlayers,
    /// The quiz could not be fetched.
    #[error("quiz `{quiz_id}` could not be loaded: {reason}")]
    QuizUnavailable {
        /// Quiz the room was opened for.
        quiz_id: String,
        /// Why loading failed.
        reason: String,
    },
    /// The quiz has no questions.
    #[error("quiz `{quiz_id}` has no questions")]
    QuizEmpty {
        /// Quiz the room was opened for.
        quiz_id: String,
    },
    /// A question has no option marked correct.
    #[error("question {index} of quiz `{quiz_id}` has no correct option")]
    QuestionMalformed {
        /// Quiz the room was opened for.
        quiz_id: String,
        /// Zero-based position of the question.
        index: usize,
    },
    /// A question has a zero time limit and would close before anyone answers.
    #[error("question {index} of quiz `{quiz_id}` has no time limit")]
    QuestionUntimed {
        /// Quiz the room was opened for.
        quiz_id: String,
        /// Zero-based position of the question.
        index: usize,
    },
    /// An asynchronous transition is still pending.
    #[error("another action is still in progress")]
    Busy,
    /// Durable storage is down (degraded mode).
    #[error("storage unavailable")]
    StorageUnavailable,
    /// The connection is bound to a different room.
    #[error("this connection already belongs to another room")]
    AlreadyInRoom,
    /// Every sampled join code was in use.
    #[error("no free room code, try again")]
    NoFreeCode,
}

impl RoomError {
    /// Text shown to the client. Players get a generic wording, the host the full detail.
    pub fn user_message(&self, for_host: bool) -> String {
        if for_host {
            return self.to_string();
        }
        match self {
            RoomError::NotFound => "Room not found.".into(),
            RoomError::Ended => "This game has already ended.".into(),
            RoomError::Full { .. } => "This room is full.".into(),
            RoomError::NicknameTaken { .. } => {
                "That nickname is already taken, please pick another one.".into()
            }
            RoomError::AnswerLocked => "Your answer is already locked in.".into(),
            RoomError::WrongPhase { .. } | RoomError::InvalidOption { .. } => {
                "That action is not available right now.".into()
            }
            RoomError::StorageUnavailable | RoomError::NoFreeCode => {
                "The service is temporarily unavailable.".into()
            }
            RoomError::AlreadyInRoom => "Leave your current room first.".into(),
            _ => "Something went wrong, please try again.".into(),
        }
    }
}

impl From<PlanError> for RoomError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => RoomError::Busy,
            PlanError::InvalidTransition(invalid) => RoomError::WrongPhase {
                actual: invalid.from,
            },
        }
    }
}

impl From<ApplyError> for RoomError {
    fn from(_: ApplyError) -> Self {
        RoomError::Busy
    }
}

/// Result of a `join-room` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Rejoined {
        /// Previous connection of the same user, to be forgotten by the registry.
        replaced: Option<ConnectionId>,
        /// Option the user already picked for the open question.
        previous_answer: Option<usize>,
    },
}

/// Result of an accepted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub user_id: String,
    /// Every online player is locked in, so the round can settle now.
    pub settle_now: bool,
}

/// Scored round, ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSettlement {
    pub question_index: usize,
    pub history: Vec<HistoryEntity>,
}

/// What follows a results screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Next question is open; its timer runs for `time_limit_secs`.
    Question { time_limit_secs: u32 },
    /// No questions left; the finish transition is planned.
    Finish(PlanId),
}

/// Result of a participant's connection dropping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectOutcome {
    pub user_id: String,
    pub role: Role,
    pub settle_now: bool,
}

/// Final position of a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub participant: ParticipantRef,
    pub user_id: String,
    pub display_name: String,
    pub score: u32,
    pub rank: u32,
}

/// First participant of a room.
#[derive(Debug, Clone)]
pub struct HostSeat {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub display_name: String,
}

/// Authoritative state of a live room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    join_code: JoinCode,
    session_id: Uuid,
    quiz_id: String,
    host_id: String,
    team_id: Option<String>,
    participants: IndexMap<String, Participant>,
    questions: Vec<QuestionEntity>,
    current_question_index: Option<usize>,
    machine: RoomStateMachine,
    answers: HashMap<String, Vec<Answer>>,
    answer_counts: Vec<u32>,
    round_outcomes: HashMap<String, RoundOutcome>,
    settings: RoomSettings,
    /// Settings frozen when the current question opened.
    round_settings: RoomSettings,
    question_started_at: Option<SystemTime>,
    max_participants: usize,
}

impl Room {
    pub fn new(
        join_code: JoinCode,
        session_id: Uuid,
        quiz_id: String,
        host: HostSeat,
        settings: RoomSettings,
        team_id: Option<String>,
        max_participants: usize,
    ) -> Self {
        let mut participants = IndexMap::new();
        participants.insert(
            host.user_id.clone(),
            Participant {
                connection_id: Some(host.connection_id),
                user_id: host.user_id.clone(),
                display_name: host.display_name,
                is_online: true,
                score: 0,
                role: Role::Host,
                has_answered: false,
                guest: false,
            },
        );

        Self {
            join_code,
            session_id,
            quiz_id,
            host_id: host.user_id,
            team_id,
            participants,
            questions: Vec::new(),
            current_question_index: None,
            machine: RoomStateMachine::new(),
            answers: HashMap::new(),
            answer_counts: Vec::new(),
            round_outcomes: HashMap::new(),
            settings,
            round_settings: settings,
            question_started_at: None,
            max_participants: max_participants.max(1),
        }
    }

    pub fn join_code(&self) -> JoinCode {
        self.join_code
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn quiz_id(&self) -> &str {
        &self.quiz_id
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn team_id(&self) -> Option<&str> {
        self.team_id.as_deref()
    }

    pub fn phase(&self) -> RoomPhase {
        self.machine.phase()
    }

    /// Participants in join order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.get(user_id)
    }

    pub fn participant_by_connection(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants
            .values()
            .find(|p| p.connection_id == Some(connection_id))
    }

    pub fn capacity(&self) -> usize {
        self.max_participants
    }

    pub fn player_count(&self) -> usize {
        self.players().count()
    }

    pub fn settings(&self) -> RoomSettings {
        self.settings
    }

    pub fn current_question_index(&self) -> Option<usize> {
        self.current_question_index
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn current_question(&self) -> Option<&QuestionEntity> {
        self.current_question_index
            .and_then(|index| self.questions.get(index))
    }

    pub fn question_started_at(&self) -> Option<SystemTime> {
        self.question_started_at
    }

    pub fn answer_counts(&self) -> &[u32] {
        &self.answer_counts
    }

    /// Answers submitted by `user_id` for the current question, oldest first.
    pub fn answers_of(&self, user_id: &str) -> &[Answer] {
        self.answers.get(user_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn round_outcome(&self, user_id: &str) -> Option<&RoundOutcome> {
        self.round_outcomes.get(user_id)
    }

    /// Whether an asynchronous transition is waiting to be applied.
    pub fn has_pending_transition(&self) -> bool {
        self.machine.pending().is_some()
    }

    fn players(&self) -> impl Iterator<Item = &Participant> {
        self.participants
            .values()
            .filter(|p| p.role == Role::Player)
    }

    fn online_player_count(&self) -> usize {
        self.players().filter(|p| p.is_online).count()
    }

    /// True when every online player has answered the open question.
    pub fn all_active_answered(&self) -> bool {
        self.players()
            .filter(|p| p.is_online)
            .all(|p| p.has_answered)
    }

    /// Resolve the sender of an action and require the host role.
    pub fn require_host(&self, connection_id: ConnectionId) -> Result<&Participant, RoomError> {
        let participant = self
            .participant_by_connection(connection_id)
            .ok_or(RoomError::NotInRoom)?;
        if participant.role != Role::Host {
            return Err(RoomError::NotHost);
        }
        Ok(participant)
    }

    /// Add a player, or reattach a known user to a new connection.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        user_id: &str,
        display_name: &str,
        guest: bool,
    ) -> Result<JoinOutcome, RoomError> {
        let phase = self.phase();
        if phase == RoomPhase::End {
            return Err(RoomError::Ended);
        }

        if let Some(participant) = self.participants.get_mut(user_id) {
            let replaced = participant
                .connection_id
                .replace(connection_id)
                .filter(|old| *old != connection_id);
            participant.is_online = true;

            let previous_answer = if phase == RoomPhase::Question && participant.has_answered {
                self.answers
                    .get(user_id)
                    .and_then(|answers| answers.last())
                    .map(|answer| answer.option_index)
            } else {
                None
            };
            return Ok(JoinOutcome::Rejoined {
                replaced,
                previous_answer,
            });
        }

        if self.participants.len() >= self.max_participants {
            return Err(RoomError::Full {
                capacity: self.max_participants,
            });
        }
        // Guests are stored under their nickname, so it must identify one player.
        if guest
            && self
                .participants
                .values()
                .any(|p| p.guest && p.display_name == display_name)
        {
            return Err(RoomError::NicknameTaken {
                nickname: display_name.to_owned(),
            });
        }

        self.participants.insert(
            user_id.to_owned(),
            Participant {
                connection_id: Some(connection_id),
                user_id: user_id.to_owned(),
                display_name: display_name.to_owned(),
                is_online: true,
                score: 0,
                role: Role::Player,
                has_answered: false,
                guest,
            },
        );
        Ok(JoinOutcome::Joined)
    }

    /// Validate a start request and hold the start transition until the quiz is loaded.
    pub fn plan_start(&mut self, connection_id: ConnectionId) -> Result<PlanId, RoomError> {
        self.require_host(connection_id)?;
        if self.phase() != RoomPhase::Lobby {
            return Err(RoomError::WrongPhase {
                actual: self.phase(),
            });
        }
        if self.machine.pending().is_some() {
            return Err(RoomError::Busy);
        }
        if self.online_player_count() == 0 {
            return Err(RoomError::NoPlayers);
        }
        Ok(self.machine.plan(RoomEvent::StartGame)?.id)
    }

    /// Commit a planned start with the loaded quiz and open the first question.
    ///
    /// Returns the time limit of the first question. A quiz that cannot be
    /// played aborts the plan and leaves the room in the lobby.
    pub fn apply_start(
        &mut self,
        plan_id: PlanId,
        quiz: QuizEntity,
        now: SystemTime,
    ) -> Result<u32, RoomError> {
        if let Err(err) = validate_quiz(&quiz) {
            self.abort_plan(plan_id);
            return Err(err);
        }
        if self.online_player_count() == 0 {
            self.abort_plan(plan_id);
            return Err(RoomError::NoPlayers);
        }

        self.machine.apply(plan_id)?;
        self.questions = quiz.questions;
        Ok(self.enter_question(0, now))
    }

    /// Drop a pending plan; a stale id is ignored.
    pub fn abort_plan(&mut self, plan_id: PlanId) {
        let _ = self.machine.abort(plan_id);
    }

    fn enter_question(&mut self, index: usize, now: SystemTime) -> u32 {
        self.answers.clear();
        self.round_outcomes.clear();
        for participant in self.participants.values_mut() {
            participant.has_answered = false;
        }
        let question = &self.questions[index];
        self.answer_counts = vec![0; question.options.len()];
        self.current_question_index = Some(index);
        self.question_started_at = Some(now);
        self.round_settings = self.settings;
        question.time_limit_secs
    }

    /// Record an answer for the open question.
    pub fn submit_answer(
        &mut self,
        connection_id: ConnectionId,
        claimed_user_id: Option<&str>,
        option_index: usize,
        remaining_secs: f64,
    ) -> Result<SubmitOutcome, RoomError> {
        if self.phase() != RoomPhase::Question {
            return Err(RoomError::WrongPhase {
                actual: self.phase(),
            });
        }
        let option_count = self.current_question().map_or(0, |q| q.options.len());
        let allow_change = self.round_settings.allow_answer_change;

        let participant = self
            .participants
            .values_mut()
            .find(|p| p.connection_id == Some(connection_id))
            .ok_or(RoomError::NotInRoom)?;
        if claimed_user_id.is_some_and(|claimed| claimed != participant.user_id) {
            return Err(RoomError::IdentityMismatch);
        }
        if participant.role == Role::Host {
            return Err(RoomError::HostCannotAnswer);
        }
        if option_index >= option_count {
            return Err(RoomError::InvalidOption { option_index });
        }
        if participant.has_answered && !allow_change {
            return Err(RoomError::AnswerLocked);
        }

        participant.has_answered = true;
        let user_id = participant.user_id.clone();
        self.answers
            .entry(user_id.clone())
            .or_default()
            .push(Answer {
                option_index,
                remaining_secs,
                is_correct: None,
            });

        Ok(SubmitOutcome {
            user_id,
            settle_now: !allow_change && self.all_active_answered(),
        })
    }

    /// Close the open question: tally, score and build its history records.
    ///
    /// Fails unless a question is open, so a round is never settled twice.
    pub fn settle(&mut self) -> Result<RoundSettlement, RoomError> {
        self.machine.transition(RoomEvent::RoundSettled)?;
        let index = self.current_question_index.ok_or(RoomError::WrongPhase {
            actual: RoomPhase::Lobby,
        })?;
        let question = &self.questions[index];
        let correct = question.options.iter().position(|option| option.is_correct);

        let mut counts = vec![0u32; question.options.len()];
        let mut history = Vec::new();

        for participant in self.participants.values_mut() {
            if participant.role != Role::Player {
                continue;
            }
            let answers = self
                .answers
                .get_mut(&participant.user_id)
                .map(Vec::as_mut_slice)
                .unwrap_or_default();

            for answer in answers.iter_mut() {
                answer.is_correct = Some(Some(answer.option_index) == correct);
            }

            let last = answers.last();
            if let Some(last) = last {
                counts[last.option_index] += 1;
            }
            let is_correct = last.and_then(|a| a.is_correct).unwrap_or(false);
            let points_gained = match last {
                Some(last) if is_correct => {
                    score(question.points, question.time_limit_secs, last.remaining_secs)
                }
                _ => 0,
            };
            participant.score += points_gained;

            self.round_outcomes.insert(
                participant.user_id.clone(),
                RoundOutcome {
                    option_index: last.map(|a| a.option_index),
                    is_correct,
                    points_gained,
                },
            );

            let limit = f64::from(question.time_limit_secs);
            history.push(HistoryEntity {
                game_session_id: self.session_id,
                quiz_id: self.quiz_id.clone(),
                question_id: question.id.clone(),
                question_index: index,
                participant: participant.participant_ref(),
                attempts: answers
                    .iter()
                    .map(|answer| AttemptEntity {
                        selected_option_id: question.options[answer.option_index].id.clone(),
                        is_correct: answer.is_correct.unwrap_or(false),
                        answer_time_ms: ((limit - answer.remaining_secs).max(0.0) * 1000.0)
                            as u64,
                    })
                    .collect(),
                is_ultimately_correct: is_correct,
                final_score_gained: points_gained,
            });
        }

        self.answer_counts = counts;
        Ok(RoundSettlement {
            question_index: index,
            history,
        })
    }

    /// Leave the results screen: open the next question or plan the finish.
    pub fn next_step(&mut self, now: SystemTime) -> Result<NextStep, RoomError> {
        if self.phase() != RoomPhase::Results {
            return Err(RoomError::WrongPhase {
                actual: self.phase(),
            });
        }
        let next = self.current_question_index.map_or(0, |index| index + 1);
        if next < self.questions.len() {
            self.machine.transition(RoomEvent::NextQuestion)?;
            let time_limit_secs = self.enter_question(next, now);
            Ok(NextStep::Question { time_limit_secs })
        } else {
            Ok(NextStep::Finish(self.machine.plan(RoomEvent::Finish)?.id))
        }
    }

    /// Commit a planned finish.
    pub fn apply_finish(&mut self, plan_id: PlanId) -> Result<(), RoomError> {
        self.machine.apply(plan_id)?;
        self.current_question_index = Some(self.questions.len());
        self.answers.clear();
        self.round_outcomes.clear();
        self.answer_counts.clear();
        self.question_started_at = None;
        Ok(())
    }

    /// Players ordered by score with competition ranks; ties keep join order.
    pub fn final_standings(&self) -> Vec<Standing> {
        let mut players: Vec<&Participant> = self.players().collect();
        players.sort_by(|a, b| b.score.cmp(&a.score));

        let mut standings: Vec<Standing> = Vec::with_capacity(players.len());
        for (position, player) in players.into_iter().enumerate() {
            let rank = match standings.last() {
                Some(previous) if previous.score == player.score => previous.rank,
                _ => position as u32 + 1,
            };
            standings.push(Standing {
                participant: player.participant_ref(),
                user_id: player.user_id.clone(),
                display_name: player.display_name.clone(),
                score: player.score,
                rank,
            });
        }
        standings
    }

    /// Mark the participant behind `connection_id` offline.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<DisconnectOutcome> {
        let participant = self
            .participants
            .values_mut()
            .find(|p| p.connection_id == Some(connection_id))?;
        participant.connection_id = None;
        participant.is_online = false;
        let user_id = participant.user_id.clone();
        let role = participant.role;

        let settle_now = role == Role::Player
            && self.phase() == RoomPhase::Question
            && !self.round_settings.allow_answer_change
            && self.all_active_answered();

        Some(DisconnectOutcome {
            user_id,
            role,
            settle_now,
        })
    }

    /// Host-only settings change; applies from the next question on.
    pub fn update_settings(
        &mut self,
        connection_id: ConnectionId,
        patch: SettingsPatch,
    ) -> Result<RoomSettings, RoomError> {
        self.require_host(connection_id)?;
        self.settings.apply(patch);
        Ok(self.settings)
    }

    /// Validate a replay request and hold it until the new session is stored.
    pub fn plan_replay(&mut self, connection_id: ConnectionId) -> Result<PlanId, RoomError> {
        self.require_host(connection_id)?;
        Ok(self.machine.plan(RoomEvent::PlayAgain)?.id)
    }

    /// Commit a planned replay: back to the lobby under a fresh session with every score reset.
    pub fn apply_replay(&mut self, plan_id: PlanId, session_id: Uuid) -> Result<(), RoomError> {
        self.machine.apply(plan_id)?;
        self.session_id = session_id;
        self.questions.clear();
        self.current_question_index = None;
        self.answers.clear();
        self.answer_counts.clear();
        self.round_outcomes.clear();
        self.question_started_at = None;
        for participant in self.participants.values_mut() {
            participant.score = 0;
            participant.has_answered = false;
        }
        Ok(())
    }

    /// Forget every connection; used when a room is revived from the cache.
    pub fn mark_all_offline(&mut self) {
        for participant in self.participants.values_mut() {
            participant.connection_id = None;
            participant.is_online = false;
        }
    }

    /// Seconds left on the open question at wall-clock time `now`.
    pub fn remaining_secs_at(&self, now: SystemTime) -> Option<f64> {
        let started = self.question_started_at?;
        let limit = f64::from(self.current_question()?.time_limit_secs);
        let elapsed = now
            .duration_since(started)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0);
        Some((limit - elapsed).max(0.0))
    }
}

/// Check that a quiz can be played from start to end.
pub fn validate_quiz(quiz: &QuizEntity) -> Result<(), RoomError> {
    if quiz.questions.is_empty() {
        return Err(RoomError::QuizEmpty {
            quiz_id: quiz.id.clone(),
        });
    }
    for (index, question) in quiz.questions.iter().enumerate() {
        if !question.options.iter().any(|option| option.is_correct) {
            return Err(RoomError::QuestionMalformed {
                quiz_id: quiz.id.clone(),
                index,
            });
        }
        if question.time_limit_secs == 0 {
            return Err(RoomError::QuestionUntimed {
                quiz_id: quiz.id.clone(),
                index,
            });
        }
    }
    Ok(())
}
