//! Per-task log sinks.

use async_trait::async_trait;
use kubefleet_steps::OutputSink;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Opens the output destination of one task run.
#[async_trait]
pub trait LogSinks: Send + Sync {
    async fn open(&self, task_id: &str) -> AppResult<Box<OutputSink>>;
}

/// Writes each task's output to `<dir>/<task id>.log`.
#[derive(Debug, Clone)]
pub struct FileLogSinks {
    dir: PathBuf,
}

impl FileLogSinks {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the log file of `task_id`.
    pub fn path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{}.log", task_id))
    }
}

#[async_trait]
impl LogSinks for FileLogSinks {
    async fn open(&self, task_id: &str) -> AppResult<Box<OutputSink>> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            AppError::Storage(format!("create log dir {}: {}", self.dir.display(), e))
        })?;
        let path = self.path(task_id);
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| AppError::Storage(format!("open log {}: {}", path.display(), e)))?;
        tracing::debug!(task_id = %task_id, path = %path.display(), "Opened task log");
        Ok(Box::new(file))
    }
}

/// Discards all output.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardLogSinks;

#[async_trait]
impl LogSinks for DiscardLogSinks {
    async fn open(&self, _task_id: &str) -> AppResult<Box<OutputSink>> {
        Ok(Box::new(tokio::io::sink()))
    }
}
