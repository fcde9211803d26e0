//! GUI agent run loop
//!
//! One `run()` drives screenshot -> model -> parse -> execute iterations
//! until a terminal status. Every fatal path only sets the status and error
//! and breaks out of the loop; the terminal notifications are sent from one
//! place in [`Run::finish`], so they happen exactly once.
//!
//! Cancellation is cooperative. It is checked before the screenshot, after
//! it, before the model call, after it and after action execution, and every
//! long await (screenshot, model call, action, sleeps, pause) races the stop
//! token.

use crate::control::{PauseOutcome, RunControl};
use crate::diagnostics::classify_init_error;
use crate::observer::{NoopObserver, RunObserver};
use crate::operator::{ExecuteParams, ExecuteStatus, Operator, ScreenshotStatus};
use crate::parser::{ActionParser, DefaultActionParser};
use crate::prompt::{build_messages, default_system_prompt};
use crate::reserved::{ReservedActions, ReservedSignal};
use crate::state_machine::{transition, Event};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use xagent_core::fail_open::fail_open;
use xagent_core::{
    now_millis, ActionPrediction, AgentStatus, ConversationEntry, GuiSettings, Result, RunUpdate,
    ScreenContext, Screenshot, ScreenshotFailurePolicy, Timing, XAgentError,
};
use xagent_model::{abortable, classify_model_error, retry_with_bail, ModelCaller, RetryPolicy};

/// State of one `run()` invocation, returned by value when it ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub status: AgentStatus,
    pub transcript: Vec<ConversationEntry>,
    /// Set only when `status` is ERROR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub loop_count: usize,
    pub screenshot_error_count: usize,
}

impl RunState {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: AgentStatus::Init,
            transcript: Vec::new(),
            error: None,
            loop_count: 0,
            screenshot_error_count: 0,
        }
    }
}

/// Screenshot-predict-act agent
pub struct GuiAgent {
    operator: Arc<dyn Operator>,
    model: Arc<dyn ModelCaller>,
    parser: Arc<dyn ActionParser>,
    observer: Arc<dyn RunObserver>,
    reserved: ReservedActions,
    settings: GuiSettings,
    system_prompt: String,
    control: RunControl,
}

impl GuiAgent {
    pub fn new(operator: Arc<dyn Operator>, model: Arc<dyn ModelCaller>, settings: GuiSettings) -> Self {
        let system_prompt = settings
            .system_prompt
            .clone()
            .unwrap_or_else(default_system_prompt);

        Self {
            operator,
            model,
            parser: Arc::new(DefaultActionParser),
            observer: Arc::new(NoopObserver),
            reserved: ReservedActions::default(),
            settings,
            system_prompt,
            control: RunControl::new(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn ActionParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_reserved_actions(mut self, reserved: ReservedActions) -> Self {
        self.reserved = reserved;
        self
    }

    /// Cancel runs when `signal` fires
    ///
    /// Replaces the run controls, so call this before handing out
    /// [`GuiAgent::control`].
    pub fn with_abort_signal(mut self, signal: &CancellationToken) -> Self {
        self.control = RunControl::with_abort_signal(signal);
        self
    }

    /// Pause/resume/stop handle for in-flight runs
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    /// Run the loop for `instruction` until a terminal status
    pub async fn run(&self, instruction: &str) -> RunState {
        let mut run = Run::new(self);
        info!("Starting GUI run {}: {}", run.state.run_id, instruction);

        run.push(ConversationEntry::instruction(instruction));

        match self.operator.do_initialize().await {
            Ok(()) => {
                run.apply(Event::Start);
                run.emit(Vec::new());
                run.run_loop().await;
            }
            Err(e) => {
                let diagnostic = classify_init_error(&e.to_string());
                run.fail(diagnostic, e);
            }
        }

        run.finish().await
    }
}

/// Result of executing one action with retries
enum StepOutcome {
    Done(ExecuteStatus),
    Exhausted { attempts: usize, error: XAgentError },
    Stopped,
}

/// Mutable state of a single run. Only the loop writes to it.
struct Run<'a> {
    agent: &'a GuiAgent,
    state: RunState,
    screen: ScreenContext,
    fatal: Option<XAgentError>,
    last_screenshot_error: Option<String>,
}

impl<'a> Run<'a> {
    fn new(agent: &'a GuiAgent) -> Self {
        Self {
            agent,
            state: RunState::new(),
            screen: ScreenContext::default(),
            fatal: None,
            last_screenshot_error: None,
        }
    }

    fn control(&self) -> &RunControl {
        &self.agent.control
    }

    fn settings(&self) -> &GuiSettings {
        &self.agent.settings
    }

    fn apply(&mut self, event: Event) {
        match transition(self.state.status, event) {
            Ok(next) => self.state.status = next,
            Err(e) => debug!("Run {}: {}", self.state.run_id, e),
        }
    }

    /// Record a fatal failure. A cancelled run stops instead of failing.
    fn fail(&mut self, message: String, error: XAgentError) {
        if self.control().is_cancelled() {
            debug!("Failure after cancellation, stopping: {}", message);
            self.apply(Event::Stopped);
            return;
        }

        self.apply(Event::Failed);
        if self.state.status == AgentStatus::Error {
            self.state.error = Some(message);
            self.fatal = Some(error);
        }
    }

    /// Cancellation checkpoint
    fn stopped(&mut self) -> bool {
        if self.control().is_cancelled() {
            self.apply(Event::Stopped);
            true
        } else {
            false
        }
    }

    fn emit(&self, entries: Vec<ConversationEntry>) {
        self.agent.observer.on_data(RunUpdate {
            status: self.state.status,
            transcript: entries,
            error: self.state.error.clone(),
        });
    }

    /// Append an entry and notify observers with only that entry
    fn push(&mut self, entry: ConversationEntry) {
        self.state.transcript.push(entry.clone());
        self.emit(vec![entry]);
    }

    async fn run_loop(&mut self) {
        let max_loops = self.settings().max_loop_count;
        let max_screenshot_errors = self.settings().max_screenshot_errors;

        loop {
            if self.control().is_paused() {
                self.apply(Event::Pause);
                self.emit(Vec::new());
                info!("Run {} paused", self.state.run_id);

                if self.control().wait_if_paused().await == PauseOutcome::Cancelled {
                    self.apply(Event::Stopped);
                    break;
                }
                self.apply(Event::Resume);
                self.emit(Vec::new());
                info!("Run {} resumed", self.state.run_id);
            }

            if self.stopped() {
                break;
            }

            if self.state.loop_count >= max_loops {
                let message = format!(
                    "Reached the maximum loop count of {} without finishing the task",
                    max_loops
                );
                self.fail(message.clone(), XAgentError::Other(message));
                break;
            }

            if self.state.screenshot_error_count >= max_screenshot_errors {
                let message = format!(
                    "Screenshot failed {} times in a row: {}",
                    self.state.screenshot_error_count,
                    self.last_screenshot_error.as_deref().unwrap_or("unknown error")
                );
                self.fail(message.clone(), XAgentError::Screenshot(message));
                break;
            }

            self.state.loop_count += 1;
            debug!("Run {} loop {}/{}", self.state.run_id, self.state.loop_count, max_loops);

            // Single attempt per iteration; failures are counted, not retried here
            let shot_start = now_millis();
            let agent = self.agent;
            let captured = abortable(self.capture(), agent.control.cancelled()).await;
            let shot = match captured {
                Ok(shot) => {
                    self.state.screenshot_error_count = 0;
                    shot
                }
                Err(e) if e.is_abort() || self.control().is_cancelled() => {
                    self.apply(Event::Stopped);
                    break;
                }
                Err(e) => {
                    self.state.screenshot_error_count += 1;
                    self.last_screenshot_error = Some(e.to_string());
                    warn!(
                        "Screenshot failed ({}/{}): {}",
                        self.state.screenshot_error_count, max_screenshot_errors, e
                    );

                    let delay = self.settings().screenshot_error_delay();
                    if !self.control().sleep(delay).await {
                        self.apply(Event::Stopped);
                        break;
                    }

                    match self.settings().screenshot_failure_policy {
                        ScreenshotFailurePolicy::Abort => {
                            self.fail(format!("Screenshot failed: {}", e), e);
                            break;
                        }
                        ScreenshotFailurePolicy::Retry => {
                            // Failed captures do not use up the loop budget
                            self.state.loop_count -= 1;
                            continue;
                        }
                    }
                }
            };

            if self.stopped() {
                break;
            }
            self.push(ConversationEntry::screenshot(shot, Timing::since(shot_start)));

            let messages = build_messages(&self.agent.system_prompt, &self.state.transcript);
            if self.stopped() {
                break;
            }

            let model_start = now_millis();
            let policy = RetryPolicy::new(
                self.settings().model_max_retries,
                self.settings().model_retry_delay(),
            );
            let model = &agent.model;
            let messages = &messages;
            let screen = &self.screen;
            let answer = abortable(
                retry_with_bail("model call", policy, move |attempt| {
                    debug!("Calling model {} (attempt {})", model.model_name(), attempt);
                    model.invoke(messages, screen)
                }),
                agent.control.cancelled(),
            )
            .await;

            let text = match answer {
                Ok(text) => text,
                Err(e) if e.is_abort() || self.control().is_cancelled() => {
                    info!("Model call cancelled: {}", e);
                    self.apply(Event::Stopped);
                    break;
                }
                Err(e) => {
                    let kind = classify_model_error(&e, self.agent.model.model_name());
                    error!("Model call failed: {}", e);
                    self.fail(kind.diagnostic(), e);
                    break;
                }
            };

            if self.stopped() {
                break;
            }

            if text.trim().is_empty() {
                warn!("Model returned empty output, continuing with the next loop");
                continue;
            }

            let parsed = self
                .agent
                .parser
                .parse(&text, self.settings().factors, &self.screen)
                .parsed;
            debug!("Parsed {} actions", parsed.len());
            self.push(ConversationEntry::assistant(
                text.clone(),
                parsed.clone(),
                Timing::since(model_start),
            ));

            self.execute_actions(&text, &parsed).await;
            if self.state.status.is_terminal() {
                break;
            }

            if self.stopped() {
                break;
            }

            let interval = self.settings().loop_interval();
            if !self.control().sleep(interval).await {
                self.apply(Event::Stopped);
                break;
            }
        }
    }

    /// Capture a screenshot and refresh the screen geometry
    async fn capture(&mut self) -> Result<Screenshot> {
        let output = self.agent.operator.do_screenshot().await?;

        let base64 = match (output.status, output.base64) {
            (ScreenshotStatus::Success, Some(data)) if !data.is_empty() => data,
            (ScreenshotStatus::Success, _) => {
                return Err(XAgentError::Screenshot("no image data returned".to_string()))
            }
            (ScreenshotStatus::Failed, _) => {
                return Err(XAgentError::Screenshot(
                    output
                        .error_message
                        .unwrap_or_else(|| "capture failed".to_string()),
                ))
            }
        };

        let screen = self.agent.operator.get_screen_context().await?;
        let scale_factor = output.scale_factor.unwrap_or(screen.scale_factor);
        self.screen = ScreenContext {
            scale_factor,
            ..screen
        };

        Ok(Screenshot {
            base64,
            width: screen.width,
            height: screen.height,
            scale_factor,
        })
    }

    /// Execute parsed actions in order until one ends the run
    async fn execute_actions(&mut self, prediction: &str, actions: &[ActionPrediction]) {
        for action in actions {
            let signal = self.agent.reserved.lookup(&action.action_type);

            if let Some(signal) = signal.filter(|signal| !signal.executes()) {
                self.end_reserved(signal, &action.action_type);
                return;
            }

            match self.execute_with_retry(prediction, action).await {
                StepOutcome::Stopped => {
                    self.apply(Event::Stopped);
                    return;
                }
                StepOutcome::Exhausted { attempts, error } => {
                    let message = format!(
                        "Action `{}` failed after {} attempts: {}",
                        action.action_type, attempts, error
                    );
                    self.fail(message, error);
                    return;
                }
                StepOutcome::Done(ExecuteStatus::NeedsInput) => {
                    info!("Operator needs a fresh model call");
                    self.apply(Event::NeedsInput);
                    return;
                }
                StepOutcome::Done(ExecuteStatus::End) => {
                    self.apply(Event::Finished);
                    return;
                }
                StepOutcome::Done(ExecuteStatus::Continue) => {}
            }

            if let Some(signal) = signal {
                self.end_reserved(signal, &action.action_type);
                return;
            }
        }
    }

    /// Apply the terminal status of a reserved action
    fn end_reserved(&mut self, signal: ReservedSignal, action_type: &str) {
        match signal.status() {
            AgentStatus::Error => {
                let message = format!(
                    "The model reported `{}`; the task cannot continue in this environment",
                    action_type
                );
                self.fail(message.clone(), XAgentError::Other(message));
            }
            AgentStatus::CallUser => self.apply(Event::CallUser),
            _ => self.apply(Event::Finished),
        }
    }

    /// Execute one action, taking a recovery screenshot between attempts
    async fn execute_with_retry(&mut self, prediction: &str, action: &ActionPrediction) -> StepOutcome {
        let max_attempts = self.settings().step_max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let params = ExecuteParams {
                prediction: prediction.to_string(),
                parsed_prediction: action.clone(),
                screen_width: self.screen.width,
                screen_height: self.screen.height,
                scale_factor: self.screen.scale_factor,
                factors: self.settings().factors,
            };

            let result = abortable(
                self.agent.operator.do_execute(params),
                self.control().cancelled(),
            )
            .await;

            let error = match result {
                Ok(output) => {
                    if let Some(message) = &output.message {
                        debug!("Action {} -> {}", action.action_type, message);
                    }
                    return StepOutcome::Done(output.status);
                }
                Err(e) if e.is_abort() || self.control().is_cancelled() => return StepOutcome::Stopped,
                Err(e) => e,
            };

            warn!(
                "Action {} failed (attempt {}/{}): {}",
                action.action_type, attempt, max_attempts, error
            );

            let delay = self.settings().step_retry_delay();
            if !self.control().sleep(delay).await {
                return StepOutcome::Stopped;
            }

            if attempt >= max_attempts {
                return StepOutcome::Exhausted {
                    attempts: attempt,
                    error,
                };
            }

            // The failed attempt may have changed the screen
            let shot_start = now_millis();
            let agent = self.agent;
            match abortable(self.capture(), agent.control.cancelled()).await {
                Ok(shot) => self.push(ConversationEntry::screenshot(shot, Timing::since(shot_start))),
                Err(e) if e.is_abort() => return StepOutcome::Stopped,
                Err(e) => warn!("Recovery screenshot failed: {}", e),
            }
        }
    }

    /// Terminal notifications and cleanup. Runs on every exit path.
    async fn finish(mut self) -> RunState {
        let status = self.state.status;
        let run_id = self.state.run_id;

        match status {
            AgentStatus::Error => error!(
                "Run {} failed: {}",
                run_id,
                self.state.error.as_deref().unwrap_or("unknown error")
            ),
            AgentStatus::End => info!("Run {} completed after {} loops", run_id, self.state.loop_count),
            AgentStatus::UserStopped => info!("Run {} stopped by user", run_id),
            AgentStatus::CallLlm => info!("Run {} is waiting for a fresh model call", run_id),
            AgentStatus::CallUser => info!("Run {} asked for human help", run_id),
            other => warn!("Run {} ended in non-terminal status {}", run_id, other),
        }

        if status == AgentStatus::Error {
            let error = self.fatal.take().unwrap_or_else(|| {
                XAgentError::Other(self.state.error.clone().unwrap_or_default())
            });
            self.agent.observer.on_error(&error);
        }

        // Let observers finish handling the last entry before the status-only update
        tokio::task::yield_now().await;
        self.emit(Vec::new());

        // The caller resumes a CALL_LLM run on the same operator
        if status != AgentStatus::CallLlm {
            let operator = &self.agent.operator;
            fail_open("operator_cleanup", || operator.cleanup()).await;
        }

        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RecordingObserver;
    use crate::operator::{ExecuteOutput, ScreenshotOutput};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use xagent_core::Origin;
    use xagent_model::ChatMessage;

    #[derive(Clone, Copy, PartialEq)]
    enum ExecBehavior {
        Succeed,
        Fail,
        NeedsInput,
    }

    #[derive(Clone, Copy, PartialEq)]
    enum ShotBehavior {
        Succeed,
        /// `status: failed`
        Failed,
        /// `do_screenshot` returns an error
        Throw,
        /// `status: success` without image data
        Empty,
    }

    struct MockOperator {
        init_error: Option<String>,
        shot: ShotBehavior,
        exec: ExecBehavior,
        cancel_on_execute: Option<CancellationToken>,
        screenshots: AtomicUsize,
        executes: AtomicUsize,
        cleanups: AtomicUsize,
        executed: std::sync::Mutex<Vec<String>>,
    }

    impl MockOperator {
        fn new() -> Self {
            Self {
                init_error: None,
                shot: ShotBehavior::Succeed,
                exec: ExecBehavior::Succeed,
                cancel_on_execute: None,
                screenshots: AtomicUsize::new(0),
                executes: AtomicUsize::new(0),
                cleanups: AtomicUsize::new(0),
                executed: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn with_exec(mut self, exec: ExecBehavior) -> Self {
            self.exec = exec;
            self
        }
    }

    #[async_trait]
    impl Operator for MockOperator {
        async fn do_initialize(&self) -> Result<()> {
            match &self.init_error {
                Some(message) => Err(XAgentError::OperatorInit(message.clone())),
                None => Ok(()),
            }
        }

        async fn do_screenshot(&self) -> Result<ScreenshotOutput> {
            self.screenshots.fetch_add(1, Ordering::SeqCst);
            match self.shot {
                ShotBehavior::Succeed => Ok(ScreenshotOutput::success("iVBORw0KGgo=", 1.0)),
                ShotBehavior::Failed => Ok(ScreenshotOutput::failed("display asleep")),
                ShotBehavior::Throw => Err(XAgentError::Screenshot("capture device lost".to_string())),
                ShotBehavior::Empty => Ok(ScreenshotOutput {
                    base64: None,
                    ..ScreenshotOutput::success("", 1.0)
                }),
            }
        }

        async fn get_screen_context(&self) -> Result<ScreenContext> {
            Ok(ScreenContext {
                width: 1920,
                height: 1080,
                scale_factor: 1.0,
            })
        }

        async fn do_execute(&self, params: ExecuteParams) -> Result<ExecuteOutput> {
            self.executes.fetch_add(1, Ordering::SeqCst);
            self.executed
                .lock()
                .unwrap()
                .push(params.parsed_prediction.action_type.clone());
            if let Some(token) = &self.cancel_on_execute {
                token.cancel();
            }
            match self.exec {
                ExecBehavior::Succeed => Ok(ExecuteOutput::default()),
                ExecBehavior::Fail => Err(XAgentError::Operator("element not found".to_string())),
                ExecBehavior::NeedsInput => Ok(ExecuteOutput::with_status(ExecuteStatus::NeedsInput)),
            }
        }

        async fn cleanup(&self) -> Result<()> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    type Script = Box<dyn Fn(usize) -> Result<String> + Send + Sync>;

    /// Model answering from a script indexed by call number (starting at 1)
    struct ScriptedModel {
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(script: impl Fn(usize) -> Result<String> + Send + Sync + 'static) -> Self {
            Self {
                script: Box::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        fn always(text: &'static str) -> Self {
            Self::new(move |_| Ok(text.to_string()))
        }
    }

    #[async_trait]
    impl ModelCaller for ScriptedModel {
        async fn invoke(&self, _messages: &[ChatMessage], _screen: &ScreenContext) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            (self.script)(call)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn settings() -> GuiSettings {
        GuiSettings::default().without_delays()
    }

    fn agent(operator: &Arc<MockOperator>, model: &Arc<ScriptedModel>, settings: GuiSettings) -> GuiAgent {
        GuiAgent::new(operator.clone(), model.clone(), settings)
    }

    const CLICK: &str = "Thought: try the button\nAction: click(start_box='(100,200)')";
    const FINISHED: &str = "Thought: done\nAction: finished()";

    #[tokio::test]
    async fn test_finished_on_first_iteration() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::always(FINISHED));
        let state = agent(&operator, &model, settings()).run("click button").await;

        assert_eq!(state.status, AgentStatus::End);
        assert_eq!(state.transcript.len(), 3);
        assert_eq!(state.transcript[0].text, "click button");
        assert!(state.transcript[1].screenshot.is_some());
        assert_eq!(state.transcript[2].origin, Origin::Assistant);
        assert_eq!(state.transcript[2].parsed_actions.as_ref().unwrap()[0].action_type, "finished");
        assert!(state.error.is_none());
        assert_eq!(operator.executes.load(Ordering::SeqCst), 1);
        assert_eq!(operator.cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_error_from_model_stops_run() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::new(|call| {
            if call == 2 {
                Err(XAgentError::model("AbortError: The user aborted a request."))
            } else {
                Ok(CLICK.to_string())
            }
        }));
        let observer = Arc::new(RecordingObserver::new());
        let state = agent(&operator, &model, settings())
            .with_observer(observer.clone())
            .run("click button")
            .await;

        assert_eq!(state.status, AgentStatus::UserStopped);
        assert!(state.error.is_none());
        assert!(observer.errors().is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_is_fatal() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::new(|_| {
            Err(XAgentError::model("Request failed with status code 401"))
        }));
        let observer = Arc::new(RecordingObserver::new());
        let state = agent(&operator, &model, settings())
            .with_observer(observer.clone())
            .run("click button")
            .await;

        assert_eq!(state.status, AgentStatus::Error);
        assert!(state.error.as_deref().unwrap().contains("Authentication"));
        assert_eq!(observer.errors().len(), 1);
        assert_eq!(state.loop_count, 1);
    }

    #[tokio::test]
    async fn test_loop_ceiling() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::always(CLICK));
        let settings = GuiSettings {
            max_loop_count: 4,
            ..settings()
        };
        let state = agent(&operator, &model, settings).run("never done").await;

        assert_eq!(state.status, AgentStatus::Error);
        assert!(state.error.as_deref().unwrap().contains('4'));
        assert_eq!(state.loop_count, 4);
        assert_eq!(operator.executes.load(Ordering::SeqCst), 4);
        assert_eq!(model.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_screenshot_ceiling() {
        let operator = Arc::new(MockOperator {
            shot: ShotBehavior::Failed,
            ..MockOperator::new()
        });
        let model = Arc::new(ScriptedModel::always(FINISHED));
        let state = agent(&operator, &model, settings()).run("click button").await;

        assert_eq!(state.status, AgentStatus::Error);
        assert_eq!(operator.screenshots.load(Ordering::SeqCst), 5);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert!(state.error.as_deref().unwrap().contains("display asleep"));
        assert_eq!(state.loop_count, 0);
    }

    #[tokio::test]
    async fn test_every_screenshot_failure_kind_counts() {
        for (shot, reason) in [
            (ShotBehavior::Failed, "display asleep"),
            (ShotBehavior::Throw, "capture device lost"),
            (ShotBehavior::Empty, "no image data"),
        ] {
            let operator = Arc::new(MockOperator {
                shot,
                ..MockOperator::new()
            });
            let model = Arc::new(ScriptedModel::always(FINISHED));
            let state = agent(&operator, &model, settings()).run("click button").await;

            assert_eq!(state.status, AgentStatus::Error, "{}", reason);
            assert_eq!(state.screenshot_error_count, 5, "{}", reason);
            assert_eq!(operator.screenshots.load(Ordering::SeqCst), 5, "{}", reason);
            assert_eq!(model.calls.load(Ordering::SeqCst), 0, "{}", reason);
            assert!(state.error.as_deref().unwrap().contains(reason), "{}", reason);
        }
    }

    #[tokio::test]
    async fn test_screenshot_abort_policy_fails_fast() {
        let operator = Arc::new(MockOperator {
            shot: ShotBehavior::Failed,
            ..MockOperator::new()
        });
        let model = Arc::new(ScriptedModel::always(FINISHED));
        let settings = GuiSettings {
            screenshot_failure_policy: ScreenshotFailurePolicy::Abort,
            ..settings()
        };
        let state = agent(&operator, &model, settings).run("click button").await;

        assert_eq!(state.status, AgentStatus::Error);
        assert_eq!(operator.screenshots.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_failure() {
        let signal = CancellationToken::new();
        let operator = Arc::new(MockOperator {
            exec: ExecBehavior::Fail,
            cancel_on_execute: Some(signal.clone()),
            ..MockOperator::new()
        });
        let model = Arc::new(ScriptedModel::always(CLICK));
        let observer = Arc::new(RecordingObserver::new());
        let state = agent(&operator, &model, settings())
            .with_abort_signal(&signal)
            .with_observer(observer.clone())
            .run("click button")
            .await;

        assert_eq!(state.status, AgentStatus::UserStopped);
        assert!(state.error.is_none());
        assert!(observer.errors().is_empty());
        assert_eq!(operator.executes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_before_run() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::always(FINISHED));
        let agent = agent(&operator, &model, settings());
        agent.stop();

        let state = agent.run("click button").await;
        assert_eq!(state.status, AgentStatus::UserStopped);
        assert_eq!(operator.screenshots.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_step_retry_exhaustion() {
        let operator = Arc::new(MockOperator::new().with_exec(ExecBehavior::Fail));
        let model = Arc::new(ScriptedModel::always(CLICK));
        let state = agent(&operator, &model, settings()).run("click button").await;

        assert_eq!(state.status, AgentStatus::Error);
        assert!(state.error.as_deref().unwrap().contains("3 attempts"));
        assert_eq!(operator.executes.load(Ordering::SeqCst), 3);

        // instruction, screenshot, answer, then one recovery shot after attempts 1 and 2
        assert_eq!(state.transcript.len(), 5);
        let recovery: Vec<_> = state.transcript[3..]
            .iter()
            .filter(|entry| entry.screenshot.is_some())
            .collect();
        assert_eq!(recovery.len(), 2);
        assert_eq!(operator.screenshots.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_needs_input_returns_call_llm() {
        let operator = Arc::new(MockOperator::new().with_exec(ExecBehavior::NeedsInput));
        let model = Arc::new(ScriptedModel::always(CLICK));
        let state = agent(&operator, &model, settings()).run("click button").await;

        assert_eq!(state.status, AgentStatus::CallLlm);
        assert_eq!(state.transcript.len(), 3);
        assert_eq!(state.loop_count, 1);
        assert_eq!(operator.cleanups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_init_failure_classified() {
        let operator = Arc::new(MockOperator {
            init_error: Some("screen capture permission denied".to_string()),
            ..MockOperator::new()
        });
        let model = Arc::new(ScriptedModel::always(FINISHED));
        let state = agent(&operator, &model, settings()).run("click button").await;

        assert_eq!(state.status, AgentStatus::Error);
        assert!(state.error.as_deref().unwrap().starts_with("Failed to access the screen"));
        assert_eq!(state.loop_count, 0);
        assert_eq!(operator.screenshots.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_env_is_never_executed() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::always("Action: error_env()"));
        let state = agent(&operator, &model, settings()).run("click button").await;

        assert_eq!(state.status, AgentStatus::Error);
        assert!(state.error.as_deref().unwrap().contains("error_env"));
        assert_eq!(operator.executes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_custom_reserved_table() {
        let reserved = ReservedActions::default()
            .with("give_up", ReservedSignal::Fail)
            .with("handoff", ReservedSignal::CallUser);

        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::always("Action: give_up()"));
        let state = agent(&operator, &model, settings())
            .with_reserved_actions(reserved.clone())
            .run("click button")
            .await;
        assert_eq!(state.status, AgentStatus::Error);
        assert!(state.error.as_deref().unwrap().contains("give_up"));
        assert_eq!(operator.executes.load(Ordering::SeqCst), 0);

        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::always("Action: handoff()"));
        let state = agent(&operator, &model, settings())
            .with_reserved_actions(reserved)
            .run("click button")
            .await;
        assert_eq!(state.status, AgentStatus::CallUser);
        assert_eq!(operator.executed.lock().unwrap().as_slice(), ["handoff"]);
    }

    #[tokio::test]
    async fn test_call_user_executes_then_ends() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::always("Action: call_user()"));
        let state = agent(&operator, &model, settings()).run("log in").await;

        assert_eq!(state.status, AgentStatus::CallUser);
        assert_eq!(*operator.executed.lock().unwrap(), vec!["call_user".to_string()]);
    }

    #[tokio::test]
    async fn test_call_user_can_be_unreserved() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::new(|call| {
            Ok(if call == 1 { "Action: call_user()" } else { FINISHED }.to_string())
        }));
        let state = agent(&operator, &model, settings())
            .with_reserved_actions(ReservedActions::default().without(crate::reserved::CALL_USER))
            .run("log in")
            .await;

        assert_eq!(state.status, AgentStatus::End);
        assert_eq!(state.loop_count, 2);
    }

    #[tokio::test]
    async fn test_actions_after_finish_are_skipped() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::always(
            "Action: type(content='x')\nfinished()\nclick(start_box='(1,1)')",
        ));
        let state = agent(&operator, &model, settings()).run("type x").await;

        assert_eq!(state.status, AgentStatus::End);
        assert_eq!(
            *operator.executed.lock().unwrap(),
            vec!["type".to_string(), "finished".to_string()]
        );
    }

    #[tokio::test]
    async fn test_empty_output_continues() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::new(|call| {
            Ok(if call == 1 { "   " } else { FINISHED }.to_string())
        }));
        let state = agent(&operator, &model, settings()).run("click button").await;

        assert_eq!(state.status, AgentStatus::End);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        // instruction, screenshot, screenshot, answer
        assert_eq!(state.transcript.len(), 4);
    }

    #[tokio::test]
    async fn test_model_retry_recovers() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::new(|call| {
            if call == 1 {
                Err(XAgentError::Model {
                    status: Some(500),
                    message: "upstream overloaded".to_string(),
                })
            } else {
                Ok(FINISHED.to_string())
            }
        }));
        let settings = GuiSettings {
            model_max_retries: 2,
            ..settings()
        };
        let state = agent(&operator, &model, settings).run("click button").await;

        assert_eq!(state.status, AgentStatus::End);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_observer_receives_newest_entry_and_final_status() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::always(FINISHED));
        let observer = Arc::new(RecordingObserver::new());
        agent(&operator, &model, settings())
            .with_observer(observer.clone())
            .run("click button")
            .await;

        let updates = observer.updates();
        assert!(updates.iter().all(|update| update.transcript.len() <= 1));
        let screenshots = updates
            .iter()
            .filter(|update| update.transcript.iter().any(|e| e.screenshot.is_some()))
            .count();
        assert_eq!(screenshots, 1);

        let last = updates.last().unwrap();
        assert_eq!(last.status, AgentStatus::End);
        assert!(last.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::always(FINISHED));
        let observer = Arc::new(RecordingObserver::new());
        let agent = agent(&operator, &model, settings()).with_observer(observer.clone());
        let control = agent.control();
        control.pause();

        let handle = tokio::spawn(async move { agent.run("click button").await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(operator.screenshots.load(Ordering::SeqCst), 0);
        assert!(observer
            .updates()
            .iter()
            .any(|update| update.status == AgentStatus::Paused));

        control.resume();
        let state = handle.await.unwrap();
        assert_eq!(state.status, AgentStatus::End);
        assert_eq!(operator.screenshots.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_while_paused() {
        let operator = Arc::new(MockOperator::new());
        let model = Arc::new(ScriptedModel::always(FINISHED));
        let agent = agent(&operator, &model, settings());
        let control = agent.control();
        control.pause();

        let handle = tokio::spawn(async move { agent.run("click button").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        control.stop();

        let state = handle.await.unwrap();
        assert_eq!(state.status, AgentStatus::UserStopped);
        assert_eq!(operator.screenshots.load(Ordering::SeqCst), 0);
    }
}
