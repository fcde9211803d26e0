//! Pure state machine for run status
//!
//! `transition(status, event)` has no I/O and never panics. The run loop
//! feeds every status change through it so a terminal status cannot be
//! left by accident.

use thiserror::Error;
use xagent_core::AgentStatus;

/// Events that drive status changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Operator initialized, loop starting
    Start,
    /// `pause()` observed at the pause gate
    Pause,
    /// `resume()` released the pause gate
    Resume,
    /// Task complete
    Finished,
    /// Fatal failure
    Failed,
    /// Cancellation observed
    Stopped,
    /// Operator handed control back for a fresh model call
    NeedsInput,
    /// Human help requested
    CallUser,
}

/// Rejected transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition from {from} on {event:?}")]
pub struct InvalidTransition {
    pub from: AgentStatus,
    pub event: Event,
}

/// Next status for `event`, or an error when the event does not apply
///
/// Pausing while paused and resuming while running are no-ops. Every event
/// on a terminal status is rejected.
pub fn transition(status: AgentStatus, event: Event) -> Result<AgentStatus, InvalidTransition> {
    use AgentStatus::*;

    let next = match (status, event) {
        (s, _) if s.is_terminal() => None,

        (Init, Event::Start) => Some(Running),
        // Initialization failures end the run before it starts
        (Init, Event::Failed) => Some(Error),
        (Init, Event::Stopped) => Some(UserStopped),

        (Running, Event::Pause) | (Paused, Event::Pause) => Some(Paused),
        (Paused, Event::Resume) | (Running, Event::Resume) => Some(Running),

        (Running, Event::Finished) => Some(End),
        (Running, Event::Failed) => Some(Error),
        (Running, Event::NeedsInput) => Some(CallLlm),
        (Running, Event::CallUser) => Some(CallUser),
        (Running, Event::Stopped) | (Paused, Event::Stopped) => Some(UserStopped),

        _ => None,
    };

    next.ok_or(InvalidTransition { from: status, event })
}
