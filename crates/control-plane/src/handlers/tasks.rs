//! Task API handlers.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::AppResult;
use crate::workflows::{Task, TaskRepository};

/// Full task record, including the run config (credentials excluded).
///
/// `GET /tasks/{id}`
pub async fn get(
    State(tasks): State<TaskRepository>,
    Path(id): Path<String>,
) -> AppResult<Json<Task>> {
    Ok(Json(tasks.get(&id).await?))
}
