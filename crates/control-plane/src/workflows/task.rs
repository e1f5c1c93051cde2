//! Task records and their status state machine.

use chrono::{DateTime, Utc};
use kubefleet_steps::Config;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Aggregate task status.
///
/// `pending -> running -> {success | failure}`; both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Status of a single step within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Per-step status entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    pub step_name: String,
    pub status: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl StepStatus {
    /// Create a step status in pending state.
    pub fn new(step_name: &str) -> Self {
        Self {
            step_name: step_name.to_string(),
            status: StepState::Pending,
            error_message: None,
            started_at: None,
            ended_at: None,
        }
    }
}

/// One execution of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    /// Workflow kind this task executes.
    #[serde(rename = "type")]
    pub kind: String,

    pub status: TaskStatus,

    #[serde(rename = "stepsStatuses")]
    pub step_statuses: Vec<StepStatus>,

    /// Run configuration, written once when the task starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a pending task with one pending status per step.
    pub fn new<S: AsRef<str>>(kind: &str, steps: &[S]) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            status: TaskStatus::Pending,
            step_statuses: steps.iter().map(|s| StepStatus::new(s.as_ref())).collect(),
            config: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name of the cluster this task targets, once it has a config.
    pub fn cluster_name(&self) -> Option<&str> {
        self.config.as_ref().map(|c| c.cluster_name.as_str())
    }

    /// Move from pending to running and capture the run configuration.
    pub fn start(&mut self, config: Config) -> AppResult<()> {
        if self.status != TaskStatus::Pending {
            return Err(invalid(self.status, TaskStatus::Running));
        }
        self.config = Some(config);
        self.status = TaskStatus::Running;
        self.touch();
        Ok(())
    }

    /// Mark step `index` running.
    pub fn begin_step(&mut self, index: usize) -> AppResult<()> {
        self.ensure_running()?;
        let step = self.step_mut(index)?;
        if step.status != StepState::Pending {
            return Err(invalid(step.status, StepState::Running));
        }
        step.status = StepState::Running;
        step.started_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Mark step `index` successful.
    pub fn complete_step(&mut self, index: usize) -> AppResult<()> {
        self.ensure_running()?;
        let step = self.step_mut(index)?;
        if step.status != StepState::Running {
            return Err(invalid(step.status, StepState::Success));
        }
        step.status = StepState::Success;
        step.ended_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Mark step `index` failed, skip every later step and fail the task.
    ///
    /// A step that never got to run (cancelled before it started) may fail
    /// straight from pending.
    pub fn fail_step(&mut self, index: usize, message: impl Into<String>) -> AppResult<()> {
        self.ensure_running()?;
        let now = Utc::now();
        let step = self.step_mut(index)?;
        if !matches!(step.status, StepState::Pending | StepState::Running) {
            return Err(invalid(step.status, StepState::Failure));
        }
        step.status = StepState::Failure;
        step.error_message = Some(message.into());
        step.started_at.get_or_insert(now);
        step.ended_at = Some(now);

        for later in self.step_statuses.iter_mut().skip(index + 1) {
            later.status = StepState::Skipped;
        }
        self.status = TaskStatus::Failure;
        self.touch();
        Ok(())
    }

    /// Finish a task whose steps all succeeded.
    pub fn succeed(&mut self) -> AppResult<()> {
        self.ensure_running()?;
        if let Some(step) = self
            .step_statuses
            .iter()
            .find(|s| s.status != StepState::Success)
        {
            return Err(AppError::Validation(format!(
                "step {} is {}, not success",
                step.step_name, step.status
            )));
        }
        self.status = TaskStatus::Success;
        self.touch();
        Ok(())
    }

    /// First failed step, if any.
    pub fn failed_step(&self) -> Option<&StepStatus> {
        self.step_statuses
            .iter()
            .find(|s| s.status == StepState::Failure)
    }

    fn ensure_running(&self) -> AppResult<()> {
        if self.status == TaskStatus::Running {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                from: self.status.to_string(),
                to: "step update".to_string(),
            })
        }
    }

    fn step_mut(&mut self, index: usize) -> AppResult<&mut StepStatus> {
        let len = self.step_statuses.len();
        self.step_statuses
            .get_mut(index)
            .ok_or_else(|| AppError::Internal(format!("step index {} out of {}", index, len)))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn invalid(from: impl std::fmt::Display, to: impl std::fmt::Display) -> AppError {
    AppError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_task() -> Task {
        let mut task = Task::new("DeleteNode", &["detach", "delete_vm", "remove"]);
        task.start(Config {
            cluster_name: "prod".to_string(),
            ..Default::default()
        })
        .unwrap();
        task
    }

    fn states(task: &Task) -> Vec<StepState> {
        task.step_statuses.iter().map(|s| s.status).collect()
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new("DeleteNode", &["a", "b"]);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(states(&task), vec![StepState::Pending, StepState::Pending]);
        assert!(task.config.is_none());
        assert!(task.cluster_name().is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Task::new("k", &["s"]);
        let b = Task::new("k", &["s"]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut task = running_task();
        let err = task.start(Config::default()).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(task.cluster_name(), Some("prod"));
    }

    #[test]
    fn test_fail_skips_remaining_steps() {
        let mut task = running_task();
        task.begin_step(0).unwrap();
        task.complete_step(0).unwrap();
        task.begin_step(1).unwrap();
        task.fail_step(1, "quota exceeded").unwrap();

        assert_eq!(
            states(&task),
            vec![StepState::Success, StepState::Failure, StepState::Skipped]
        );
        assert_eq!(task.status, TaskStatus::Failure);
        assert_eq!(
            task.failed_step().unwrap().error_message.as_deref(),
            Some("quota exceeded")
        );
    }

    #[test]
    fn test_no_transition_out_of_terminal_state() {
        let mut task = running_task();
        task.begin_step(0).unwrap();
        task.fail_step(0, "boom").unwrap();

        assert!(task.begin_step(1).is_err());
        assert!(task.succeed().is_err());
        assert_eq!(task.status, TaskStatus::Failure);
    }

    #[test]
    fn test_succeed_requires_all_steps_success() {
        let mut task = running_task();
        task.begin_step(0).unwrap();
        task.complete_step(0).unwrap();
        assert!(matches!(task.succeed(), Err(AppError::Validation(_))));

        for i in 1..3 {
            task.begin_step(i).unwrap();
            task.complete_step(i).unwrap();
        }
        task.succeed().unwrap();
        assert_eq!(task.status, TaskStatus::Success);
    }

    #[test]
    fn test_complete_requires_running_step() {
        let mut task = running_task();
        assert!(task.complete_step(0).is_err());
        assert!(task.begin_step(7).is_err());
    }

    #[test]
    fn test_serialized_field_names() {
        let task = running_task();
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "DeleteNode");
        assert_eq!(json["status"], "running");
        assert_eq!(json["stepsStatuses"][0]["stepName"], "detach");
        assert_eq!(json["stepsStatuses"][0]["status"], "pending");
        assert_eq!(json["config"]["clusterName"], "prod");
    }
}
