//! # xagent-gui
//!
//! Screenshot-predict-act GUI automation for xAgent.
//!
//! This crate provides:
//! - The [`GuiAgent`] run loop with bounded retries, pause/resume and
//!   cooperative cancellation
//! - The [`Operator`] contract for automation backends, plus a
//!   [`ReplayOperator`] that serves recorded screens
//! - Action parsing and the reserved action table
//! - Parallel subagent dispatch

mod agent;
mod control;
mod diagnostics;
mod dispatch;
mod observer;
mod operator;
mod parser;
mod prompt;
mod replay;
pub mod reserved;
mod state_machine;

pub use agent::{GuiAgent, RunState};
pub use control::{PauseOutcome, RunControl};
pub use diagnostics::classify_init_error;
pub use dispatch::{dispatch_parallel, SubagentOutcome, SubagentTask};
pub use observer::{NoopObserver, RecordingObserver, RunObserver};
pub use operator::{
    ExecuteOutput, ExecuteParams, ExecuteStatus, Operator, ScreenshotOutput, ScreenshotStatus,
};
pub use parser::{ActionParser, DefaultActionParser, ParsedOutput};
pub use prompt::{build_messages, default_system_prompt};
pub use replay::ReplayOperator;
pub use reserved::{ReservedActions, ReservedSignal};
pub use state_machine::{transition, Event, InvalidTransition};
