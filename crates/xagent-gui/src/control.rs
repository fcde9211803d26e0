//! External run controls: pause, resume, stop
//!
//! A [`RunControl`] is cloned out of the agent and used from any task while
//! `run()` is in flight. Pause state is a `watch` channel the loop waits on;
//! stop is a cancellation token. When the caller supplies an abort signal,
//! the stop token is its child, so either one cancels the run.

use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Outcome of waiting at the pause checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    /// Was not paused
    NotPaused,
    /// Was paused and has been resumed
    Resumed,
    /// Cancelled while paused
    Cancelled,
}

/// Pause/resume/stop handle shared between the loop and its callers
#[derive(Debug, Clone)]
pub struct RunControl {
    paused: Arc<watch::Sender<bool>>,
    cancel: CancellationToken,
}

impl RunControl {
    pub fn new() -> Self {
        Self::from_token(CancellationToken::new())
    }

    /// Controls that are also cancelled by an external abort signal
    pub fn with_abort_signal(signal: &CancellationToken) -> Self {
        Self::from_token(signal.child_token())
    }

    fn from_token(cancel: CancellationToken) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
            cancel,
        }
    }

    /// Ask the loop to block at its next pause checkpoint
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    /// Release a paused loop. No effect when not paused.
    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Stop the run at its next checkpoint. Sticky for this control.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Whether `stop()` was called or the abort signal fired
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Block while paused. Cancellation releases the wait.
    pub async fn wait_if_paused(&self) -> PauseOutcome {
        if !self.is_paused() {
            return PauseOutcome::NotPaused;
        }

        let mut rx = self.paused.subscribe();
        tokio::select! {
            _ = self.cancel.cancelled() => PauseOutcome::Cancelled,
            // The sender lives in `self`, so the channel cannot close here
            _ = rx.wait_for(|paused| !*paused) => PauseOutcome::Resumed,
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns false if cancelled.
    pub async fn sleep(&self, duration: std::time::Duration) -> bool {
        if duration.is_zero() {
            return !self.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_not_paused_returns_immediately() {
        let control = RunControl::new();
        assert_eq!(control.wait_if_paused().await, PauseOutcome::NotPaused);
    }

    #[tokio::test]
    async fn test_resume_releases_waiter() {
        let control = RunControl::new();
        control.pause();
        assert!(control.is_paused());

        let remote = control.clone();
        let waiter = tokio::spawn(async move { remote.wait_if_paused().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        control.resume();
        assert_eq!(waiter.await.unwrap(), PauseOutcome::Resumed);
        assert!(!control.is_paused());
    }

    #[tokio::test]
    async fn test_stop_releases_paused_waiter() {
        let control = RunControl::new();
        control.pause();

        let remote = control.clone();
        let waiter = tokio::spawn(async move { remote.wait_if_paused().await });
        control.stop();

        assert_eq!(waiter.await.unwrap(), PauseOutcome::Cancelled);
        assert!(control.is_cancelled());
    }

    #[tokio::test]
    async fn test_abort_signal_cancels_control() {
        let signal = CancellationToken::new();
        let control = RunControl::with_abort_signal(&signal);
        assert!(!control.is_cancelled());

        signal.cancel();
        assert!(control.is_cancelled());
    }

    #[tokio::test]
    async fn test_stop_does_not_fire_abort_signal() {
        let signal = CancellationToken::new();
        let control = RunControl::with_abort_signal(&signal);
        control.stop();
        assert!(control.is_cancelled());
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_stop() {
        let control = RunControl::new();
        let remote = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.stop();
        });
        assert!(!control.sleep(Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn test_resume_when_not_paused_is_noop() {
        let control = RunControl::new();
        control.resume();
        assert!(!control.is_paused());
    }
}
