//! Replay operator: serves recorded screenshots from a directory
//!
//! Frames are the `.png` files of the directory in file-name order. Each
//! capture returns the current frame and advances; the last frame repeats.
//! Executed actions are recorded instead of being performed.

use crate::operator::{ExecuteOutput, ExecuteParams, ExecuteStatus, Operator, ScreenshotOutput};
use crate::reserved::FINISHED;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::io::Reader as ImageReader;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use xagent_core::{ActionPrediction, Result, ScreenContext, XAgentError};

#[derive(Debug, Default)]
struct ReplayState {
    frames: Vec<PathBuf>,
    cursor: usize,
    screen: ScreenContext,
    executed: Vec<ActionPrediction>,
}

/// Operator backed by a directory of PNG frames
#[derive(Debug)]
pub struct ReplayOperator {
    dir: PathBuf,
    scale_factor: f64,
    state: Mutex<ReplayState>,
}

impl ReplayOperator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            scale_factor: 1.0,
            state: Mutex::new(ReplayState::default()),
        }
    }

    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// Actions executed so far, in order
    pub fn executed(&self) -> Vec<ActionPrediction> {
        self.lock()
            .map(|state| state.executed.clone())
            .unwrap_or_default()
    }

    /// Number of frames found by `do_initialize`
    pub fn frame_count(&self) -> usize {
        self.lock().map(|state| state.frames.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ReplayState>> {
        self.state
            .lock()
            .map_err(|_| XAgentError::Operator("replay state lock poisoned".to_string()))
    }

    async fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            XAgentError::OperatorInit(format!("cannot read screen capture directory {}: {}", dir.display(), e))
        })?;

        let mut frames = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_png = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("png"))
                .unwrap_or(false);
            if is_png {
                frames.push(path);
            }
        }
        frames.sort();
        Ok(frames)
    }
}

fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|e| XAgentError::Screenshot(format!("unreadable image: {}", e)))
}

#[async_trait]
impl Operator for ReplayOperator {
    async fn do_initialize(&self) -> Result<()> {
        let frames = Self::list_frames(&self.dir).await?;
        let Some(first) = frames.first() else {
            return Err(XAgentError::OperatorInit(format!(
                "no PNG screen captures in {}",
                self.dir.display()
            )));
        };

        let bytes = tokio::fs::read(first).await?;
        let (width, height) = image_dimensions(&bytes)?;
        info!(
            "Replay operator loaded {} frames ({}x{}) from {}",
            frames.len(),
            width,
            height,
            self.dir.display()
        );

        let mut state = self.lock()?;
        state.frames = frames;
        state.cursor = 0;
        state.screen = ScreenContext {
            width,
            height,
            scale_factor: self.scale_factor,
        };
        Ok(())
    }

    async fn do_screenshot(&self) -> Result<ScreenshotOutput> {
        let path = {
            let mut state = self.lock()?;
            let Some(path) = state.frames.get(state.cursor).cloned() else {
                return Ok(ScreenshotOutput::failed("replay operator has no frames"));
            };
            state.cursor = (state.cursor + 1).min(state.frames.len() - 1);
            path
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Ok(ScreenshotOutput::failed(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let (width, height) = image_dimensions(&bytes)?;
        debug!("Replaying frame {} ({}x{})", path.display(), width, height);

        self.lock()?.screen = ScreenContext {
            width,
            height,
            scale_factor: self.scale_factor,
        };

        Ok(ScreenshotOutput::success(
            general_purpose::STANDARD.encode(&bytes),
            self.scale_factor,
        ))
    }

    async fn get_screen_context(&self) -> Result<ScreenContext> {
        Ok(self.lock()?.screen)
    }

    async fn do_execute(&self, params: ExecuteParams) -> Result<ExecuteOutput> {
        let action = params.parsed_prediction;
        info!("Replay: {} {:?}", action.action_type, action.action_inputs);

        let status = if action.action_type == FINISHED {
            ExecuteStatus::End
        } else {
            ExecuteStatus::Continue
        };
        self.lock()?.executed.push(action);

        Ok(ExecuteOutput::with_status(status))
    }

    async fn cleanup(&self) -> Result<()> {
        debug!("Replay operator cleanup");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_frame(dir: &Path, name: &str, width: u32, height: u32) {
        image::RgbImage::new(width, height)
            .save(dir.join(name))
            .unwrap();
    }

    fn params(action: &str) -> ExecuteParams {
        ExecuteParams {
            prediction: String::new(),
            parsed_prediction: ActionPrediction::new(action),
            screen_width: 0,
            screen_height: 0,
            scale_factor: 1.0,
            factors: (1000.0, 1000.0),
        }
    }

    #[tokio::test]
    async fn test_frames_advance_and_stick_on_last() {
        let temp = TempDir::new().unwrap();
        write_frame(temp.path(), "b.png", 8, 6);
        write_frame(temp.path(), "a.png", 4, 3);
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let operator = ReplayOperator::new(temp.path());
        operator.do_initialize().await.unwrap();
        assert_eq!(operator.frame_count(), 2);
        assert_eq!(operator.get_screen_context().await.unwrap().width, 4);

        let sizes = [(4, 3), (8, 6), (8, 6)];
        for expected in sizes {
            let shot = operator.do_screenshot().await.unwrap();
            assert!(shot.base64.is_some());
            let screen = operator.get_screen_context().await.unwrap();
            assert_eq!((screen.width, screen.height), expected);
        }
    }

    #[tokio::test]
    async fn test_empty_directory_fails_init() {
        let temp = TempDir::new().unwrap();
        let err = ReplayOperator::new(temp.path())
            .do_initialize()
            .await
            .unwrap_err();
        assert!(matches!(err, XAgentError::OperatorInit(_)));
        assert!(err.to_string().contains("screen captures"));
    }

    #[tokio::test]
    async fn test_screenshot_before_init_is_failed_status() {
        let temp = TempDir::new().unwrap();
        let shot = ReplayOperator::new(temp.path()).do_screenshot().await.unwrap();
        assert_eq!(shot.status, crate::operator::ScreenshotStatus::Failed);
    }

    #[tokio::test]
    async fn test_execute_records_actions() {
        let temp = TempDir::new().unwrap();
        let operator = ReplayOperator::new(temp.path());

        let out = operator.do_execute(params("click")).await.unwrap();
        assert_eq!(out.status, ExecuteStatus::Continue);
        let out = operator.do_execute(params(FINISHED)).await.unwrap();
        assert_eq!(out.status, ExecuteStatus::End);

        let executed: Vec<_> = operator
            .executed()
            .into_iter()
            .map(|a| a.action_type)
            .collect();
        assert_eq!(executed, vec!["click", "finished"]);
        operator.cleanup().await.unwrap();
        operator.cleanup().await.unwrap();
    }
}
