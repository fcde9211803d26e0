//! Run observers
//!
//! Callbacks are fire-and-forget from the loop's point of view. Each update
//! is an owned value, so the loop can never mutate what an observer holds.

use std::sync::Mutex;
use xagent_core::{RunUpdate, XAgentError};

/// Receives run progress
pub trait RunObserver: Send + Sync {
    /// Status change or new transcript entries
    fn on_data(&self, update: RunUpdate);

    /// Called once, only when the run ends with ERROR
    fn on_error(&self, _error: &XAgentError) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {
    fn on_data(&self, _update: RunUpdate) {}
}

/// Observer that keeps every update, for tests and transcript export
#[derive(Debug, Default)]
pub struct RecordingObserver {
    updates: Mutex<Vec<RunUpdate>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates received so far
    pub fn updates(&self) -> Vec<RunUpdate> {
        self.updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }

    /// Messages of the errors received so far
    pub fn errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .map(|errors| errors.clone())
            .unwrap_or_default()
    }
}

impl RunObserver for RecordingObserver {
    fn on_data(&self, update: RunUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update);
        }
    }

    fn on_error(&self, error: &XAgentError) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error.to_string());
        }
    }
}
