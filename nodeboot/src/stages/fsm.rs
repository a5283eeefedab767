//! Finite State Machine for a provisioning stage

use serde::{Deserialize, Serialize};

/// Stage state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    /// Not started yet
    Pending,

    /// Provisioning call in progress
    Running,

    /// Provisioning call exited successfully
    Succeeded,

    /// Provisioning call failed
    Failed,
}

impl StageState {
    /// Whether the stage has finished, one way or the other
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Succeeded | StageState::Failed)
    }
}

/// Stage event
#[derive(Debug, Clone)]
pub enum StageEvent {
    /// Start the provisioning call
    Start,

    /// Provisioning call succeeded
    Succeed,

    /// Provisioning call failed
    Fail(String),
}

/// Stage FSM
#[derive(Debug, Clone)]
pub struct StageFsm {
    state: StageState,
    error: Option<String>,
}

impl StageFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: StageState::Pending,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> StageState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: StageEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (StageState::Pending, StageEvent::Start) => StageState::Running,

            (StageState::Running, StageEvent::Succeed) => StageState::Succeeded,
            (StageState::Running, StageEvent::Fail(err)) => {
                self.error = Some(err.clone());
                StageState::Failed
            }

            // Terminal states accept nothing; a failed stage is never retried
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for StageFsm {
    fn default() -> Self {
        Self::new()
    }
}
