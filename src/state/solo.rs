use std::collections::BTreeMap;

use uuid::Uuid;

use crate::dao::models::{ParticipantRef, QuizEntity};

/// Graded answer of a solo player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoloAnswer {
    pub option_index: usize,
    pub is_correct: bool,
    pub points_gained: u32,
}

/// In-memory progress of a single-player run.
#[derive(Debug, Clone)]
pub struct SoloGame {
    pub session_id: Uuid,
    pub quiz: QuizEntity,
    pub participant: ParticipantRef,
    answers: BTreeMap<usize, SoloAnswer>,
}

impl SoloGame {
    pub fn new(session_id: Uuid, quiz: QuizEntity, participant: ParticipantRef) -> Self {
        Self {
            session_id,
            quiz,
            participant,
            answers: BTreeMap::new(),
        }
    }

    pub fn answer(&self, question_index: usize) -> Option<&SoloAnswer> {
        self.answers.get(&question_index)
    }

    /// Record an answer; `false` if the question was already answered.
    pub fn record(&mut self, question_index: usize, answer: SoloAnswer) -> bool {
        if self.answers.contains_key(&question_index) {
            return false;
        }
        self.answers.insert(question_index, answer);
        true
    }

    pub fn forget(&mut self, question_index: usize) {
        self.answers.remove(&question_index);
    }

    pub fn score(&self) -> u32 {
        self.answers.values().map(|answer| answer.points_gained).sum()
    }

    pub fn correct_answers(&self) -> u32 {
        self.answers.values().filter(|answer| answer.is_correct).count() as u32
    }

    pub fn answered_questions(&self) -> usize {
        self.answers.len()
    }
}
