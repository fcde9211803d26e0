//! Parallel subagent dispatch
//!
//! Each task owns its agent, so concurrent loops share no mutable state.
//! Every loop stays sequential; only the loops run side by side.

use crate::agent::{GuiAgent, RunState};
use futures::future::join_all;
use tracing::info;
use xagent_core::AgentStatus;

/// One subagent run
pub struct SubagentTask {
    pub name: String,
    pub instruction: String,
    pub agent: GuiAgent,
}

impl SubagentTask {
    pub fn new(name: impl Into<String>, instruction: impl Into<String>, agent: GuiAgent) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            agent,
        }
    }
}

/// Final state of one subagent
#[derive(Debug, Clone)]
pub struct SubagentOutcome {
    pub name: String,
    pub state: RunState,
}

impl SubagentOutcome {
    pub fn succeeded(&self) -> bool {
        self.state.status == AgentStatus::End
    }
}

/// Run every task concurrently. Outcomes are in input order.
pub async fn dispatch_parallel(tasks: Vec<SubagentTask>) -> Vec<SubagentOutcome> {
    info!("Dispatching {} subagents", tasks.len());

    let runs = tasks.into_iter().map(|task| async move {
        let state = task.agent.run(&task.instruction).await;
        info!("Subagent {} finished with status {}", task.name, state.status);
        SubagentOutcome {
            name: task.name,
            state,
        }
    });

    join_all(runs).await
}
