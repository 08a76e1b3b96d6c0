use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Phases a room moves through during a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoomPhase {
    /// Players gather; the host can start the game.
    Lobby,
    /// A question is open for answers.
    Question,
    /// The last question is settled and its outcome is shown.
    Results,
    /// All questions were played.
    End,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Host starts the game from the lobby.
    StartGame,
    /// Every active player answered or the question timer expired.
    RoundSettled,
    /// Move from a results screen to the next question.
    NextQuestion,
    /// Leave the results of the last question for the final screen.
    Finish,
    /// Host restarts the room after a finished game.
    PlayAgain,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    pub from: RoomPhase,
    pub event: RoomEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    #[error("a transition is already pending")]
    AlreadyPending,
    #[error(transparent)]
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("no transition is pending")]
    NoPending,
    #[error("pending plan {expected} does not match {got}")]
    IdMismatch { expected: PlanId, got: PlanId },
    #[error("phase changed since planning (expected {expected:?}, got {actual:?})")]
    PhaseMismatch {
        expected: RoomPhase,
        actual: RoomPhase,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortError {
    #[error("no transition is pending")]
    NoPending,
    #[error("pending plan {expected} does not match {got}")]
    IdMismatch { expected: PlanId, got: PlanId },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A validated transition that has not been committed yet.
#[derive(Debug, Clone)]
pub struct Plan {
    pub id: PlanId,
    pub from: RoomPhase,
    pub to: RoomPhase,
    pub event: RoomEvent,
    pub pending_since: Instant,
}

/// Phase tracker of a single room.
///
/// Synchronous transitions go through [`RoomStateMachine::transition`]. Those
/// that wait on I/O (loading the quiz, draining history writes) are planned
/// first and later applied or aborted; only one plan may be pending at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomStateMachine {
    phase: RoomPhase,
    version: usize,
    #[serde(skip)]
    pending: Option<Plan>,
}

impl Default for RoomStateMachine {
    fn default() -> Self {
        Self {
            phase: RoomPhase::Lobby,
            version: 0,
            pending: None,
        }
    }
}

impl RoomStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    /// Number of committed transitions.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Target phase of the pending plan, if any.
    pub fn pending(&self) -> Option<&Plan> {
        self.pending.as_ref()
    }

    /// Validate `event` against the current phase and hold it as the pending plan.
    pub fn plan(&mut self, event: RoomEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let to = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to,
            event,
            pending_since: Instant::now(),
        };
        self.pending = Some(plan.clone());
        Ok(plan)
    }

    /// Commit the pending plan identified by `plan_id`.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<RoomPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        self.phase = plan.to;
        self.version += 1;
        Ok(self.phase)
    }

    /// Drop the pending plan without changing phase.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Plan and apply in one step.
    pub fn transition(&mut self, event: RoomEvent) -> Result<RoomPhase, PlanError> {
        let plan = self.plan(event)?;
        self.phase = plan.to;
        self.version += 1;
        self.pending = None;
        Ok(self.phase)
    }

    /// Force the machine back to the lobby, dropping any pending plan.
    pub fn reset(&mut self) {
        self.phase = RoomPhase::Lobby;
        self.version += 1;
        self.pending = None;
    }

    fn compute_transition(&self, event: RoomEvent) -> Result<RoomPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (RoomPhase::Lobby, RoomEvent::StartGame) => RoomPhase::Question,
            (RoomPhase::Question, RoomEvent::RoundSettled) => RoomPhase::Results,
            (RoomPhase::Results, RoomEvent::NextQuestion) => RoomPhase::Question,
            (RoomPhase::Results, RoomEvent::Finish) => RoomPhase::End,
            (RoomPhase::End, RoomEvent::PlayAgain) => RoomPhase::Lobby,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }
}
