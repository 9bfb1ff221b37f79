use crate::artifact::StageFailure;
use crate::core::errors::{DepwallError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of a [`TaskState`], without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskStateKind {
    NotComputed,
    Queued,
    Started,
    Failed,
    Succeeded,
}

impl TaskStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStateKind::NotComputed => "NOT_COMPUTED",
            TaskStateKind::Queued => "QUEUED",
            TaskStateKind::Started => "STARTED",
            TaskStateKind::Failed => "FAILED",
            TaskStateKind::Succeeded => "SUCCEEDED",
        }
    }

    /// Failed or succeeded
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStateKind::Failed | TaskStateKind::Succeeded)
    }
}

impl fmt::Display for TaskStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state one pipeline stage of one node is in.
///
/// States are values; every transition produces the next state and the old one is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState<R> {
    NotComputed,
    Queued,
    Started,
    Failed(StageFailure),
    Succeeded(R),
}

impl<R> TaskState<R> {
    pub fn kind(&self) -> TaskStateKind {
        match self {
            TaskState::NotComputed => TaskStateKind::NotComputed,
            TaskState::Queued => TaskStateKind::Queued,
            TaskState::Started => TaskStateKind::Started,
            TaskState::Failed(_) => TaskStateKind::Failed,
            TaskState::Succeeded(_) => TaskStateKind::Succeeded,
        }
    }

    fn illegal<T>(&self, transition: &'static str) -> Result<T> {
        Err(DepwallError::illegal_transition(self.kind().as_str(), transition))
    }

    fn queued(&self) -> Result<Self> {
        match self {
            // NotComputed is the first queueing, Failed a retry, Succeeded a recomputation
            TaskState::NotComputed | TaskState::Failed(_) | TaskState::Succeeded(_) => {
                Ok(TaskState::Queued)
            }
            TaskState::Queued | TaskState::Started => self.illegal("queue"),
        }
    }

    fn started(&self) -> Result<Self> {
        match self {
            TaskState::NotComputed | TaskState::Queued => Ok(TaskState::Started),
            _ => self.illegal("start"),
        }
    }

    fn failed(&self, failure: StageFailure) -> Result<Self> {
        match self {
            TaskState::Started => Ok(TaskState::Failed(failure)),
            _ => self.illegal("fail"),
        }
    }

    fn succeeded(&self, result: R) -> Result<Self> {
        match self {
            TaskState::Started => Ok(TaskState::Succeeded(result)),
            _ => self.illegal("succeed"),
        }
    }
}

/// Handle over the single live [`TaskState`] of a (node, stage) pair.
///
/// An illegal transition returns [`DepwallError::IllegalTransition`] and leaves the state
/// untouched. Callers treat that error as a logic bug, never as a data condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task<R> {
    state: TaskState<R>,
}

impl<R> Default for Task<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Task<R> {
    pub fn new() -> Self {
        Self {
            state: TaskState::NotComputed,
        }
    }

    /// The task was queued but not yet taken out of the queue
    pub fn queue(&mut self) -> Result<()> {
        self.state = self.state.queued()?;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.state = self.state.started()?;
        Ok(())
    }

    pub fn fail(&mut self, failure: StageFailure) -> Result<()> {
        self.state = self.state.failed(failure)?;
        Ok(())
    }

    pub fn succeed(&mut self, result: R) -> Result<()> {
        self.state = self.state.succeeded(result)?;
        Ok(())
    }

    pub fn current_state(&self) -> TaskStateKind {
        self.state.kind()
    }

    pub fn state(&self) -> &TaskState<R> {
        &self.state
    }

    pub fn is(&self, kind: TaskStateKind) -> bool {
        self.current_state() == kind
    }

    pub fn is_finished(&self) -> bool {
        self.current_state().is_finished()
    }

    /// Only succeeded tasks have a result
    pub fn result(&self) -> Result<&R> {
        match &self.state {
            TaskState::Succeeded(result) => Ok(result),
            other => Err(DepwallError::not_available(other.kind().as_str(), "result")),
        }
    }

    /// Only failed tasks have an error
    pub fn error(&self) -> Result<&StageFailure> {
        match &self.state {
            TaskState::Failed(failure) => Ok(failure),
            other => Err(DepwallError::not_available(other.kind().as_str(), "error")),
        }
    }

    /// `Ok(result)` for succeeded, `Err(failure)` for failed, `None` while unfinished
    pub fn outcome(&self) -> Option<std::result::Result<&R, &StageFailure>> {
        match &self.state {
            TaskState::Succeeded(result) => Some(Ok(result)),
            TaskState::Failed(failure) => Some(Err(failure)),
            _ => None,
        }
    }
}

impl<R> fmt::Display for Task<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            TaskState::Failed(failure) => write!(f, "FAILED ({})", failure),
            other => f.write_str(other.kind().as_str()),
        }
    }
}
