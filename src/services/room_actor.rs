//! One task per live room.
//!
//! Client commands, timer expiries and storage completions all reach the room
//! through a single `select!` loop, so round settlement can never race with an
//! answer or with a second timer.

use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    time::{Duration, SystemTime},
};

use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, sleep, sleep_until},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        cache::room_key,
        models::{HistoryEntity, JoinCode, QuizEntity, SessionEntity, SessionStatus},
    },
    dto::ws::{CloseReason, ServerMessage},
    services::{broadcast, results_service},
    state::{
        ConnectionId, SharedState,
        room::{JoinOutcome, NextStep, Role, Room, RoomError, SettingsPatch},
        state_machine::{PlanId, RoomPhase},
    },
};

/// Commands queued per room before the sender waits.
pub const MAILBOX_CAPACITY: usize = 64;

const HISTORY_RETRY_DELAY: Duration = Duration::from_millis(250);
const HISTORY_RETRY_MAX_DELAY: Duration = Duration::from_secs(4);

/// Everything a room actor reacts to.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        connection_id: ConnectionId,
        user_id: String,
        display_name: String,
        guest: bool,
    },
    StartGame {
        connection_id: ConnectionId,
    },
    SubmitAnswer {
        connection_id: ConnectionId,
        user_id: Option<String>,
        option_index: usize,
    },
    NextQuestion {
        connection_id: ConnectionId,
    },
    UpdateSettings {
        connection_id: ConnectionId,
        patch: SettingsPatch,
    },
    PlayAgain {
        connection_id: ConnectionId,
    },
    CloseRoom {
        connection_id: ConnectionId,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    /// Quiz content fetched for a planned start.
    QuizLoaded {
        plan_id: PlanId,
        result: Result<QuizEntity, RoomError>,
    },
    /// Durable session for a planned replay was stored (or not).
    ReplaySessionCreated {
        plan_id: PlanId,
        session_id: Uuid,
        result: Result<(), String>,
    },
    /// A round's history write finished after all its attempts.
    HistoryPersisted {
        question_index: usize,
        result: Result<(), String>,
    },
    /// Last retry of failed rounds before the game ends.
    FinalRetryDone {
        plan_id: PlanId,
        still_failing: Vec<usize>,
    },
    /// Background storage failure the host should hear about.
    StorageWarning { message: String },
    /// Copy of the current room, for read-only views.
    Inspect { reply: oneshot::Sender<Room> },
    Shutdown,
}

/// How the room came to life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Created by its host just now.
    Fresh,
    /// Rebuilt from the shared cache after a restart or on another node.
    Revived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Publish,
    Quiet,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finishing {
    /// Waiting for in-flight history writes to report back.
    AwaitingWrites(PlanId),
    /// Final retry of failed rounds is running.
    Retrying(PlanId),
}

/// Debounced writer of room snapshots to the shared cache.
struct SnapshotWriter {
    tx: watch::Sender<Option<Value>>,
    task: JoinHandle<()>,
}

impl SnapshotWriter {
    fn spawn(state: SharedState, join_code: JoinCode) -> Self {
        let (tx, mut rx) = watch::channel::<Option<Value>>(None);
        let ttl = state.config().room_cache_ttl;
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(snapshot) = rx.borrow_and_update().clone() else {
                    continue;
                };
                let Some(cache) = state.cache().await else {
                    continue;
                };
                if let Err(err) = cache.put(room_key(join_code), snapshot, ttl).await {
                    warn!(join_code, error = %err, "failed to write room snapshot");
                }
            }
        });
        Self { tx, task }
    }

    fn write(&self, room: &Room) {
        match serde_json::to_value(room) {
            Ok(value) => {
                self.tx.send_replace(Some(value));
            }
            Err(err) => warn!(join_code = room.join_code(), error = %err, "failed to encode room"),
        }
    }

    /// Stop accepting snapshots and wait for the one in flight.
    async fn close(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}

/// Serialized owner of one [`Room`].
pub struct RoomActor {
    state: SharedState,
    room: Room,
    mailbox: mpsc::Receiver<RoomCommand>,
    self_tx: mpsc::WeakSender<RoomCommand>,
    question_deadline: Option<Instant>,
    advance_deadline: Option<Instant>,
    pending_writes: HashMap<usize, Vec<HistoryEntity>>,
    failed_rounds: BTreeMap<usize, Vec<HistoryEntity>>,
    finishing: Option<Finishing>,
    host_error: Option<String>,
    snapshots: Option<SnapshotWriter>,
}

impl RoomActor {
    /// Start the actor task for `room`, fed by `mailbox`.
    pub fn spawn(
        state: SharedState,
        room: Room,
        mailbox: mpsc::Receiver<RoomCommand>,
        self_tx: mpsc::WeakSender<RoomCommand>,
        startup: Startup,
    ) -> JoinHandle<()> {
        let snapshots = SnapshotWriter::spawn(state.clone(), room.join_code());
        let actor = Self {
            state,
            room,
            mailbox,
            self_tx,
            question_deadline: None,
            advance_deadline: None,
            pending_writes: HashMap::new(),
            failed_rounds: BTreeMap::new(),
            finishing: None,
            host_error: None,
            snapshots: Some(snapshots),
        };
        tokio::spawn(actor.run(startup))
    }

    async fn run(mut self, startup: Startup) {
        let join_code = self.room.join_code();
        match startup {
            Startup::Fresh => {
                info!(join_code, session_id = %self.room.session_id(), "room created");
                broadcast::room_state_to(self.state.connections(), &self.room, self.room.host_id());
                self.write_snapshot();
            }
            Startup::Revived => {
                self.resume_timers();
                info!(join_code, phase = ?self.room.phase(), "room revived from cache");
                self.publish();
            }
        }

        loop {
            let flow = tokio::select! {
                command = self.mailbox.recv() => match command {
                    Some(command) => self.handle(command),
                    None => Flow::Stop,
                },
                _ = sleep_until_deadline(self.question_deadline) => {
                    self.question_deadline = None;
                    debug!(join_code, "question timer expired");
                    self.settle_round();
                    Flow::Publish
                }
                _ = sleep_until_deadline(self.advance_deadline) => {
                    self.advance_deadline = None;
                    if let Err(err) = self.advance() {
                        debug!(join_code, error = %err, "auto-advance skipped");
                    }
                    Flow::Publish
                }
            };

            match flow {
                Flow::Publish => self.publish(),
                Flow::Quiet => {}
                Flow::Stop => break,
            }
        }

        if let Some(snapshots) = self.snapshots.take() {
            snapshots.close().await;
        }
        debug!(join_code, "room actor stopped");
    }

    fn handle(&mut self, command: RoomCommand) -> Flow {
        match command {
            RoomCommand::Join {
                connection_id,
                user_id,
                display_name,
                guest,
            } => self.on_join(connection_id, &user_id, &display_name, guest),
            RoomCommand::StartGame { connection_id } => self.on_start(connection_id),
            RoomCommand::SubmitAnswer {
                connection_id,
                user_id,
                option_index,
            } => self.on_answer(connection_id, user_id.as_deref(), option_index),
            RoomCommand::NextQuestion { connection_id } => {
                if let Err(err) = self.room.require_host(connection_id).map(|_| ()) {
                    return self.reject(connection_id, err);
                }
                match self.advance() {
                    Ok(()) => Flow::Publish,
                    Err(err) => self.reject(connection_id, err),
                }
            }
            RoomCommand::UpdateSettings {
                connection_id,
                patch,
            } => match self.room.update_settings(connection_id, patch) {
                Ok(settings) => {
                    debug!(join_code = self.room.join_code(), ?settings, "settings updated");
                    Flow::Publish
                }
                Err(err) => self.reject(connection_id, err),
            },
            RoomCommand::PlayAgain { connection_id } => self.on_play_again(connection_id),
            RoomCommand::CloseRoom { connection_id } => {
                match self.room.require_host(connection_id).map(|_| ()) {
                    Ok(()) => self.teardown(CloseReason::ClosedByHost),
                    Err(err) => self.reject(connection_id, err),
                }
            }
            RoomCommand::Disconnect { connection_id } => self.on_disconnect(connection_id),
            RoomCommand::QuizLoaded { plan_id, result } => self.on_quiz_loaded(plan_id, result),
            RoomCommand::ReplaySessionCreated {
                plan_id,
                session_id,
                result,
            } => self.on_replay_session(plan_id, session_id, result),
            RoomCommand::HistoryPersisted {
                question_index,
                result,
            } => self.on_history_persisted(question_index, result),
            RoomCommand::FinalRetryDone {
                plan_id,
                still_failing,
            } => {
                if self.finishing != Some(Finishing::Retrying(plan_id)) {
                    return Flow::Quiet;
                }
                self.complete_finish(plan_id, still_failing)
            }
            RoomCommand::StorageWarning { message } => {
                self.warn_host(message);
                Flow::Quiet
            }
            RoomCommand::Inspect { reply } => {
                let _ = reply.send(self.room.clone());
                Flow::Quiet
            }
            RoomCommand::Shutdown => Flow::Stop,
        }
    }

    fn on_join(
        &mut self,
        connection_id: ConnectionId,
        user_id: &str,
        display_name: &str,
        guest: bool,
    ) -> Flow {
        let join_code = self.room.join_code();
        if let Some(current) = self.room.participant_by_connection(connection_id) {
            if current.user_id != user_id {
                return self.reject(connection_id, RoomError::IdentityMismatch);
            }
        }

        match self.room.join(connection_id, user_id, display_name, guest) {
            Ok(JoinOutcome::Joined) => {
                self.state.rooms().bind_connection(connection_id, join_code);
                info!(join_code, user_id, guest, "participant joined");
                Flow::Publish
            }
            Ok(JoinOutcome::Rejoined {
                replaced,
                previous_answer,
            }) => {
                if let Some(replaced) = replaced {
                    self.state.rooms().unbind_connection(replaced, join_code);
                }
                self.state.rooms().bind_connection(connection_id, join_code);
                info!(join_code, user_id, "participant rejoined");

                if let (Some(option_index), Some(question_index)) =
                    (previous_answer, self.room.current_question_index())
                {
                    self.state.connections().send(
                        connection_id,
                        &ServerMessage::PreviousAnswer {
                            question_index,
                            option_index,
                        },
                    );
                }
                Flow::Publish
            }
            Err(err) => self.reject(connection_id, err),
        }
    }

    fn on_start(&mut self, connection_id: ConnectionId) -> Flow {
        let plan_id = match self.room.plan_start(connection_id) {
            Ok(plan_id) => plan_id,
            Err(err) => return self.reject(connection_id, err),
        };

        let state = self.state.clone();
        let quiz_id = self.room.quiz_id().to_owned();
        debug!(join_code = self.room.join_code(), quiz_id, "loading quiz");
        self.spawn_reply(async move {
            let result = load_quiz(&state, quiz_id).await;
            Some(RoomCommand::QuizLoaded { plan_id, result })
        });
        Flow::Quiet
    }

    fn on_quiz_loaded(&mut self, plan_id: PlanId, result: Result<QuizEntity, RoomError>) -> Flow {
        let join_code = self.room.join_code();
        let started = result.and_then(|quiz| self.room.apply_start(plan_id, quiz, SystemTime::now()));

        match started {
            Ok(time_limit_secs) => {
                self.arm_question(time_limit_secs);
                info!(
                    join_code,
                    questions = self.room.total_questions(),
                    "game started"
                );
                self.spawn_status_update(SessionStatus::InProgress);
                Flow::Publish
            }
            Err(err) => {
                self.room.abort_plan(plan_id);
                warn!(join_code, error = %err, "game start aborted");
                self.host_error = Some(err.user_message(true));
                Flow::Publish
            }
        }
    }

    fn on_answer(
        &mut self,
        connection_id: ConnectionId,
        user_id: Option<&str>,
        option_index: usize,
    ) -> Flow {
        let remaining_secs = self
            .question_deadline
            .map(|deadline| {
                deadline
                    .saturating_duration_since(Instant::now())
                    .as_secs_f64()
            })
            .unwrap_or(0.0);

        match self
            .room
            .submit_answer(connection_id, user_id, option_index, remaining_secs)
        {
            Ok(outcome) => {
                debug!(
                    join_code = self.room.join_code(),
                    user_id = %outcome.user_id,
                    remaining_secs,
                    "answer recorded"
                );
                if outcome.settle_now {
                    self.settle_round();
                }
                Flow::Publish
            }
            Err(err) => self.reject(connection_id, err),
        }
    }

    fn on_disconnect(&mut self, connection_id: ConnectionId) -> Flow {
        let join_code = self.room.join_code();
        self.state.rooms().unbind_connection(connection_id, join_code);

        let Some(outcome) = self.room.disconnect(connection_id) else {
            return Flow::Quiet;
        };
        info!(join_code, user_id = %outcome.user_id, role = ?outcome.role, "participant disconnected");

        if outcome.role == Role::Host {
            return self.teardown(CloseReason::HostDisconnected);
        }
        if outcome.settle_now {
            self.settle_round();
        }
        Flow::Publish
    }

    fn on_play_again(&mut self, connection_id: ConnectionId) -> Flow {
        let plan_id = match self.room.plan_replay(connection_id) {
            Ok(plan_id) => plan_id,
            Err(err) => return self.reject(connection_id, err),
        };

        let state = self.state.clone();
        let session_id = Uuid::new_v4();
        let session = SessionEntity::multiplayer(
            session_id,
            self.room.quiz_id().to_owned(),
            self.room.host_id().to_owned(),
            self.room.join_code(),
            self.room.team_id().map(str::to_owned),
        );
        self.spawn_reply(async move {
            let result = match state.require_backend().await {
                Ok(backend) => backend
                    .sessions
                    .create_session(session)
                    .await
                    .map_err(|err| err.to_string()),
                Err(err) => Err(err.to_string()),
            };
            Some(RoomCommand::ReplaySessionCreated {
                plan_id,
                session_id,
                result,
            })
        });
        Flow::Quiet
    }

    fn on_replay_session(
        &mut self,
        plan_id: PlanId,
        session_id: Uuid,
        result: Result<(), String>,
    ) -> Flow {
        let join_code = self.room.join_code();
        if let Err(message) = result {
            self.room.abort_plan(plan_id);
            error!(join_code, error = %message, "could not create replay session");
            self.host_error = Some(RoomError::StorageUnavailable.user_message(true));
            return Flow::Publish;
        }

        match self.room.apply_replay(plan_id, session_id) {
            Ok(()) => {
                self.question_deadline = None;
                self.advance_deadline = None;
                self.failed_rounds.clear();
                info!(join_code, session_id = %session_id, "room reset for another game");
                Flow::Publish
            }
            Err(err) => {
                warn!(join_code, error = %err, "replay could not be applied");
                Flow::Quiet
            }
        }
    }

    fn on_history_persisted(&mut self, question_index: usize, result: Result<(), String>) -> Flow {
        let join_code = self.room.join_code();
        let records = self.pending_writes.remove(&question_index).unwrap_or_default();

        match result {
            Ok(()) => debug!(join_code, question_index, "round history stored"),
            Err(message) => {
                error!(join_code, question_index, error = %message, "round history could not be stored");
                self.failed_rounds.insert(question_index, records);
                self.warn_host(format!(
                    "History save failed for question {}. It will be retried before the game ends.",
                    question_index + 1
                ));
            }
        }

        if self.pending_writes.is_empty() {
            if let Some(Finishing::AwaitingWrites(plan_id)) = self.finishing {
                return self.final_retry(plan_id);
            }
        }
        Flow::Quiet
    }

    /// Close the open question exactly once.
    fn settle_round(&mut self) {
        let join_code = self.room.join_code();
        self.question_deadline = None;

        let settlement = match self.room.settle() {
            Ok(settlement) => settlement,
            Err(err) => {
                debug!(join_code, error = %err, "settlement skipped");
                return;
            }
        };
        info!(
            join_code,
            question_index = settlement.question_index,
            records = settlement.history.len(),
            "round settled"
        );

        self.persist_round(settlement.question_index, settlement.history);
        if self.room.settings().auto_next {
            self.advance_deadline = Some(Instant::now() + self.state.config().auto_next_delay);
        }
    }

    fn persist_round(&mut self, question_index: usize, history: Vec<HistoryEntity>) {
        self.pending_writes.insert(question_index, history.clone());
        let state = self.state.clone();
        let attempts = state.config().history_write_attempts();
        self.spawn_reply(async move {
            let result = write_history(&state, history, attempts).await;
            Some(RoomCommand::HistoryPersisted {
                question_index,
                result,
            })
        });
    }

    /// Leave the results screen: next question, or begin finishing the game.
    fn advance(&mut self) -> Result<(), RoomError> {
        self.advance_deadline = None;
        match self.room.next_step(SystemTime::now())? {
            NextStep::Question { time_limit_secs } => {
                self.arm_question(time_limit_secs);
                debug!(
                    join_code = self.room.join_code(),
                    question_index = ?self.room.current_question_index(),
                    "question opened"
                );
            }
            NextStep::Finish(plan_id) => {
                self.finishing = Some(Finishing::AwaitingWrites(plan_id));
                if self.pending_writes.is_empty() {
                    self.final_retry(plan_id);
                }
            }
        }
        Ok(())
    }

    fn final_retry(&mut self, plan_id: PlanId) -> Flow {
        let failed = std::mem::take(&mut self.failed_rounds);
        if failed.is_empty() {
            return self.complete_finish(plan_id, Vec::new());
        }

        self.finishing = Some(Finishing::Retrying(plan_id));
        let state = self.state.clone();
        self.spawn_reply(async move {
            let mut still_failing = Vec::new();
            for (question_index, records) in failed {
                if write_history(&state, records, 1).await.is_err() {
                    still_failing.push(question_index);
                }
            }
            Some(RoomCommand::FinalRetryDone {
                plan_id,
                still_failing,
            })
        });
        Flow::Quiet
    }

    fn complete_finish(&mut self, plan_id: PlanId, incomplete_questions: Vec<usize>) -> Flow {
        let join_code = self.room.join_code();
        self.finishing = None;
        if let Err(err) = self.room.apply_finish(plan_id) {
            warn!(join_code, error = %err, "finish could not be applied");
            return Flow::Quiet;
        }
        info!(join_code, session_id = %self.room.session_id(), "game finished");

        if !incomplete_questions.is_empty() {
            let questions = incomplete_questions
                .iter()
                .map(|index| (index + 1).to_string())
                .collect::<Vec<_>>()
                .join(", ");
            self.warn_host(format!(
                "Answers for question(s) {questions} could not be saved; the final report will be incomplete."
            ));
        }

        let state = self.state.clone();
        let session_id = self.room.session_id();
        let results = results_service::result_rows(&self.room.final_standings());
        self.spawn_reply(async move {
            match results_service::finalize_and_cache(&state, session_id, results, incomplete_questions)
                .await
            {
                Ok(()) => None,
                Err(err) => {
                    error!(session_id = %session_id, error = %err, "session finalization failed");
                    Some(RoomCommand::StorageWarning {
                        message: "Final results could not be saved.".into(),
                    })
                }
            }
        });
        Flow::Publish
    }

    /// Notify everyone, close the durable session and drop the room.
    fn teardown(&mut self, reason: CloseReason) -> Flow {
        let join_code = self.room.join_code();
        self.question_deadline = None;
        self.advance_deadline = None;
        broadcast::room_closed(self.state.connections(), &self.room, reason);

        let state = self.state.clone();
        let session_id = self.room.session_id();
        let completed = self.room.phase() == RoomPhase::End;
        let snapshots = self.snapshots.take();
        tokio::spawn(async move {
            if let Some(snapshots) = snapshots {
                snapshots.close().await;
            }
            state.rooms().remove_room(join_code).await;
            if completed {
                return;
            }
            let Some(backend) = state.backend().await else {
                warn!(session_id = %session_id, "storage unavailable; session left open");
                return;
            };
            if let Err(err) = backend
                .sessions
                .update_status(session_id, SessionStatus::Cancelled, SystemTime::now())
                .await
            {
                warn!(session_id = %session_id, error = %err, "failed to cancel session");
            }
        });

        info!(join_code, ?reason, "room torn down");
        Flow::Stop
    }

    fn arm_question(&mut self, time_limit_secs: u32) {
        self.advance_deadline = None;
        self.question_deadline =
            Some(Instant::now() + Duration::from_secs(u64::from(time_limit_secs)));
    }

    /// Re-arm timers of a room rebuilt from a snapshot.
    fn resume_timers(&mut self) {
        match self.room.phase() {
            RoomPhase::Question => {
                let remaining = self
                    .room
                    .remaining_secs_at(SystemTime::now())
                    .unwrap_or(0.0);
                if remaining > 0.0 {
                    self.question_deadline =
                        Some(Instant::now() + Duration::from_secs_f64(remaining));
                } else {
                    self.settle_round();
                }
            }
            RoomPhase::Results if self.room.settings().auto_next => {
                self.advance_deadline = Some(Instant::now() + self.state.config().auto_next_delay);
            }
            _ => {}
        }
    }

    fn reject(&self, connection_id: ConnectionId, err: RoomError) -> Flow {
        let for_host = self
            .room
            .participant_by_connection(connection_id)
            .is_some_and(|p| p.role == Role::Host);
        debug!(join_code = self.room.join_code(), connection_id = %connection_id, error = %err, "request rejected");
        broadcast::error_to(
            self.state.connections(),
            connection_id,
            err.user_message(for_host),
        );
        Flow::Quiet
    }

    fn warn_host(&self, message: impl Into<String>) {
        broadcast::host_warning(self.state.connections(), &self.room, message);
    }

    fn publish(&mut self) {
        let host_error = self.host_error.take();
        broadcast::room_state(self.state.connections(), &self.room, host_error.as_deref());
        self.write_snapshot();
    }

    fn write_snapshot(&self) {
        if let Some(snapshots) = &self.snapshots {
            snapshots.write(&self.room);
        }
    }

    fn spawn_status_update(&self, status: SessionStatus) {
        let state = self.state.clone();
        let session_id = self.room.session_id();
        self.spawn_reply(async move {
            let backend = state.backend().await?;
            match backend
                .sessions
                .update_status(session_id, status, SystemTime::now())
                .await
            {
                Ok(()) => None,
                Err(err) => {
                    warn!(session_id = %session_id, ?status, error = %err, "status update failed");
                    Some(RoomCommand::StorageWarning {
                        message: "Session status could not be saved.".into(),
                    })
                }
            }
        });
    }

    /// Run `task` off the room loop and feed its command back into the mailbox.
    fn spawn_reply<F>(&self, task: F)
    where
        F: Future<Output = Option<RoomCommand>> + Send + 'static,
    {
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Some(command) = task.await {
                let _ = tx.send(command).await;
            }
        });
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => futures::future::pending::<()>().await,
    }
}

async fn load_quiz(state: &SharedState, quiz_id: String) -> Result<QuizEntity, RoomError> {
    let backend = state
        .backend()
        .await
        .ok_or(RoomError::StorageUnavailable)?;
    match backend.sessions.find_quiz(quiz_id.clone()).await {
        Ok(Some(quiz)) => Ok(quiz),
        Ok(None) => Err(RoomError::QuizUnavailable {
            quiz_id,
            reason: "not found".into(),
        }),
        Err(err) => Err(RoomError::QuizUnavailable {
            quiz_id,
            reason: err.to_string(),
        }),
    }
}

/// Store one round's records, retrying with exponential backoff.
async fn write_history(
    state: &SharedState,
    records: Vec<HistoryEntity>,
    attempts: u32,
) -> Result<(), String> {
    let mut delay = HISTORY_RETRY_DELAY;
    let mut last_error = String::from("storage unavailable");

    for attempt in 1..=attempts {
        match state.backend().await {
            Some(backend) => match backend.sessions.append_history(records.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(attempt, error = %err, "history write failed");
                    last_error = err.to_string();
                }
            },
            None => warn!(attempt, "history write skipped; no storage backend"),
        }
        if attempt < attempts {
            sleep(delay).await;
            delay = (delay * 2).min(HISTORY_RETRY_MAX_DELAY);
        }
    }
    Err(last_error)
}
