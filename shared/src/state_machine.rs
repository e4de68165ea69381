//! Execution Session State Machine
//!
//! Defines valid session transitions. Four states are terminal; once one is
//! reached every further event is refused without changing state, which is
//! what guarantees a session emits exactly one terminal event.

use std::fmt;

/// Lifecycle of one execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Initializing,
    Running,
    Completed,
    Failed,
    Cancelled,
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Errored
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Execute request accepted by the registry
    RequestAccepted,
    /// Commands validated and the driver adapter acquired
    DriverReady,
    /// Stored command data was refused by the validator
    ValidationFailed,
    /// A single command failed its contract
    CommandFailed,
    /// Every command of the effective sequence succeeded
    AllCommandsSucceeded,
    /// Driver crashed or could not be acquired, or the store broke
    InfrastructureFailure,
    /// The owning channel went away
    ChannelClosed,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(SessionState),
    /// Transition was invalid from current state
    Invalid { from: SessionState, event: SessionEvent },
    /// The session already ended; the event is dropped
    AlreadyTerminal(SessionState),
}

/// The per-session state machine
#[derive(Debug)]
pub struct SessionStateMachine {
    current_state: SessionState,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.current_state
    }

    pub fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: SessionEvent) -> TransitionResult {
        if self.current_state.is_terminal() {
            return TransitionResult::AlreadyTerminal(self.current_state);
        }

        match self.get_next_state(event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn get_next_state(&self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self.current_state, event) {
            // Channel closure cancels from any live state
            (_, ChannelClosed) => Some(Cancelled),

            (Idle, RequestAccepted) => Some(Initializing),

            (Initializing, DriverReady) => Some(Running),
            (Initializing, ValidationFailed) => Some(Failed),
            (Initializing, InfrastructureFailure) => Some(Errored),

            (Running, AllCommandsSucceeded) => Some(Completed),
            (Running, CommandFailed) => Some(Failed),
            (Running, InfrastructureFailure) => Some(Errored),

            _ => None,
        }
    }
}
