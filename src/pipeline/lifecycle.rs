//! Pipeline lifecycle states

use crate::IngestError;
use std::fmt;

/// Phase of a pipeline run
///
/// Runs move strictly forward: `Idle -> Running -> Draining -> Finalizing -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Created, nothing dispatched yet
    Idle,
    /// Dispatching work items
    Running,
    /// Source exhausted or stopped; waiting for in-flight work
    Draining,
    /// Writing the final report
    Finalizing,
    /// Finished
    Done,
}

impl PipelineState {
    /// The only state this one may move to
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Running),
            Self::Running => Some(Self::Draining),
            Self::Draining => Some(Self::Finalizing),
            Self::Finalizing => Some(Self::Done),
            Self::Done => None,
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        self.successor() == Some(next)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Tracks the current state and rejects out-of-order transitions
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: PipelineState,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: PipelineState::Idle,
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: PipelineState) -> Result<(), IngestError> {
        if !self.state.can_transition_to(next) {
            return Err(IngestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("Pipeline {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }
}
