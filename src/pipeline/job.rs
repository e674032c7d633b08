//! Per-job state machine.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Walking,
    Serialized,
    AwaitingGeneration,
    Validating,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Forward by one stage, or into `Failed` from any live state.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Pending, Walking)
            | (Walking, Serialized)
            | (Serialized, AwaitingGeneration)
            | (AwaitingGeneration, Validating)
            | (Validating, Completed) => true,
            _ => false,
        }
    }

    /// The stage a failure in this state is attributed to.
    pub fn stage(self) -> Stage {
        match self {
            JobState::Pending | JobState::Walking => Stage::Walk,
            JobState::Serialized => Stage::Assemble,
            JobState::AwaitingGeneration => Stage::Generate,
            JobState::Validating | JobState::Completed | JobState::Failed => Stage::Validate,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Illegal job transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: JobState,
    pub to: JobState,
}

/// Failure details captured on entering `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailurePoint {
    pub state: JobState,
    pub stage: Stage,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub id: usize,
    pub label: String,
    state: JobState,
    failure: Option<FailurePoint>,
}

impl PipelineJob {
    pub fn new(id: usize, label: impl Into<String>) -> Self {
        PipelineJob {
            id,
            label: label.into(),
            state: JobState::Pending,
            failure: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn failure(&self) -> Option<FailurePoint> {
        self.failure
    }

    pub fn advance(&mut self, next: JobState) -> Result<JobState, IllegalTransition> {
        if !self.state.can_transition_to(next) || next == JobState::Failed {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(next)
    }

    pub fn fail(&mut self, stage: Stage, kind: ErrorKind) -> Result<JobState, IllegalTransition> {
        if !self.state.can_transition_to(JobState::Failed) {
            return Err(IllegalTransition {
                from: self.state,
                to: JobState::Failed,
            });
        }
        self.failure = Some(FailurePoint {
            state: self.state,
            stage,
            kind,
        });
        self.state = JobState::Failed;
        Ok(JobState::Failed)
    }
}
