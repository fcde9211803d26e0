//! Reserved action types
//!
//! A few action-type strings carry loop-control meaning. The mapping is a
//! table rather than a fixed enum so backends can add or drop signals
//! (for example, runs without a human in the loop can drop `call_user`).

use std::collections::HashMap;
use xagent_core::AgentStatus;

pub const FINISHED: &str = "finished";
pub const CALL_USER: &str = "call_user";
pub const ERROR_ENV: &str = "error_env";
pub const MAX_LOOP: &str = "max_loop";

/// Loop-control meaning of a reserved action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedSignal {
    /// Task complete; executed, then the run ends with END
    Finish,
    /// Environment failure; never executed, the run ends with ERROR
    Fail,
    /// Human help needed; executed, then the run ends with CALL_USER
    CallUser,
}

impl ReservedSignal {
    /// Terminal status this signal produces
    pub fn status(&self) -> AgentStatus {
        match self {
            Self::Finish => AgentStatus::End,
            Self::Fail => AgentStatus::Error,
            Self::CallUser => AgentStatus::CallUser,
        }
    }

    /// Whether the action is sent to the operator before the status applies
    pub fn executes(&self) -> bool {
        !matches!(self, Self::Fail)
    }
}

/// Table of reserved action types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedActions {
    table: HashMap<String, ReservedSignal>,
}

impl ReservedActions {
    /// Empty table: every action is ordinary
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn with(mut self, action_type: impl Into<String>, signal: ReservedSignal) -> Self {
        self.table.insert(action_type.into(), signal);
        self
    }

    pub fn without(mut self, action_type: &str) -> Self {
        self.table.remove(action_type);
        self
    }

    /// Signal for an action type, if reserved
    pub fn lookup(&self, action_type: &str) -> Option<ReservedSignal> {
        self.table.get(action_type).copied()
    }
}

impl Default for ReservedActions {
    fn default() -> Self {
        Self::empty()
            .with(FINISHED, ReservedSignal::Finish)
            .with(CALL_USER, ReservedSignal::CallUser)
            .with(ERROR_ENV, ReservedSignal::Fail)
            .with(MAX_LOOP, ReservedSignal::Fail)
    }
}
