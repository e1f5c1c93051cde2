//! Task persistence over the byte-oriented [`Storage`].

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::storage::Storage;

use super::task::Task;

/// Namespace prefix of task records.
pub const TASK_PREFIX: &str = "/tasks/";

/// Typed task store.
///
/// Encoding is JSON. Cluster-scoped queries decode the whole namespace and
/// filter on the embedded cluster name.
#[derive(Clone)]
pub struct TaskRepository {
    storage: Arc<dyn Storage>,
}

impl TaskRepository {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Insert or overwrite a task record.
    pub async fn save(&self, task: &Task) -> AppResult<()> {
        let bytes = serde_json::to_vec(task)?;
        self.storage.put(TASK_PREFIX, &task.id, &bytes).await
    }

    /// Get a task by id.
    pub async fn get(&self, id: &str) -> AppResult<Task> {
        let bytes = self.storage.get(TASK_PREFIX, id).await.map_err(|e| {
            if e.is_not_found() {
                AppError::NotFound(format!("task {}", id))
            } else {
                e
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Every persisted task.
    ///
    /// Records that fail to decode are logged and left out.
    pub async fn list_all(&self) -> AppResult<Vec<Task>> {
        let records = self.storage.get_all(TASK_PREFIX).await?;
        let mut tasks = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_slice::<Task>(&record) {
                Ok(task) => tasks.push(task),
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable task record"),
            }
        }
        Ok(tasks)
    }

    /// Tasks whose config targets `cluster_name`.
    pub async fn list_by_cluster(&self, cluster_name: &str) -> AppResult<Vec<Task>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|t| t.cluster_name() == Some(cluster_name))
            .collect())
    }

    /// Delete a task by id.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.storage.delete(TASK_PREFIX, id).await
    }

    /// Delete every task of `cluster_name`.
    ///
    /// A failed delete is logged and skipped; returns how many records went.
    pub async fn delete_for_cluster(&self, cluster_name: &str) -> AppResult<usize> {
        let tasks = self.list_by_cluster(cluster_name).await?;
        let mut deleted = 0;
        for task in tasks {
            match self.delete(&task.id).await {
                Ok(()) => deleted += 1,
                Err(e) => tracing::warn!(
                    task_id = %task.id,
                    cluster = %cluster_name,
                    error = %e,
                    "Failed to delete task"
                ),
            }
        }
        tracing::debug!(cluster = %cluster_name, deleted, "Deleted cluster tasks");
        Ok(deleted)
    }
}
