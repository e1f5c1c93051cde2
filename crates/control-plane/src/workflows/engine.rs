//! Task execution engine.
//!
//! Creates tasks from registered workflows and runs their steps strictly in
//! order on a spawned tokio task. Unrelated tasks run concurrently; nothing
//! here serializes them.

use std::sync::Arc;

use kubefleet_steps::{Config, OutputSink, StepRegistry};
use tokio::io::AsyncWriteExt;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::AppResult;
use crate::result_ext::ResultExt;

use super::completion::{Completion, RunContext, TaskFailure, TaskOutcome};
use super::logsink::LogSinks;
use super::registry::WorkflowRegistry;
use super::repository::TaskRepository;
use super::task::Task;

/// Creates and runs tasks.
#[derive(Clone)]
pub struct TaskEngine {
    workflows: Arc<WorkflowRegistry>,
    steps: Arc<StepRegistry>,
    tasks: TaskRepository,
    sinks: Arc<dyn LogSinks>,
    runs: TaskTracker,
}

impl TaskEngine {
    pub fn new(
        workflows: Arc<WorkflowRegistry>,
        steps: Arc<StepRegistry>,
        tasks: TaskRepository,
        sinks: Arc<dyn LogSinks>,
    ) -> Self {
        Self {
            workflows,
            steps,
            tasks,
            sinks,
            runs: TaskTracker::new(),
        }
    }

    pub fn workflows(&self) -> &WorkflowRegistry {
        &self.workflows
    }

    pub fn tasks(&self) -> &TaskRepository {
        &self.tasks
    }

    /// Create and persist a pending task for workflow `kind`.
    ///
    /// `NotFound` if the kind is unregistered or names a step that is not.
    pub async fn create(&self, kind: &str) -> AppResult<Task> {
        let task = self.prepare(kind)?;
        self.save_created(&task).await?;
        Ok(task)
    }

    /// Build a pending task for `kind` without storing it.
    fn prepare(&self, kind: &str) -> AppResult<Task> {
        let names = self.workflows.steps(kind)?;
        self.steps.resolve(names)?;
        Ok(Task::new(kind, names))
    }

    async fn save_created(&self, task: &Task) -> AppResult<()> {
        self.tasks.save(task).await?;
        info!(task_id = %task.id, kind = %task.kind, steps = task.step_statuses.len(), "Created task");
        Ok(())
    }

    /// Start running `task` against `config`, writing step output to `sink`.
    ///
    /// Returns immediately. The returned [`Completion`] resolves exactly once
    /// with the terminal outcome; the engine never waits for it to be read.
    pub fn run(
        &self,
        mut task: Task,
        ctx: RunContext,
        config: Config,
        sink: Box<OutputSink>,
    ) -> Completion {
        let (tx, completion) = Completion::channel(&task.id);

        if task.start(config.clone()).is_err() {
            warn!(task_id = %task.id, status = %task.status, "Task is not pending, not running it");
            tx.send(Err(TaskFailure::AlreadyStarted(task.id)));
            return completion;
        }

        let run = TaskRun {
            task,
            config,
            ctx,
            sink,
            steps: self.steps.clone(),
            tasks: self.tasks.clone(),
        };
        self.runs.spawn(async move {
            let outcome = run.execute().await;
            tx.send(outcome);
        });

        completion
    }

    /// Create a task for `kind`, open its log sink and start it.
    ///
    /// The record is stored only once the sink is open, so a failed launch
    /// leaves nothing behind.
    pub async fn launch(&self, kind: &str, ctx: RunContext, config: Config) -> AppResult<Completion> {
        let task = self.prepare(kind)?;
        let sink = self
            .sinks
            .open(&task.id)
            .await
            .log(format!("opening log sink for task {}", task.id))?;
        self.save_created(&task).await?;
        Ok(self.run(task, ctx, config, sink))
    }

    /// Wait for every started run to finish.
    ///
    /// Cancel the runs' contexts first, or this waits for their steps.
    pub async fn drain(&self) {
        self.runs.close();
        self.runs.wait().await;
        self.runs.reopen();
    }
}

/// State of one in-flight task run.
struct TaskRun {
    task: Task,
    config: Config,
    ctx: RunContext,
    sink: Box<OutputSink>,
    steps: Arc<StepRegistry>,
    tasks: TaskRepository,
}

impl TaskRun {
    async fn execute(mut self) -> TaskOutcome {
        info!(task_id = %self.task.id, kind = %self.task.kind, "Task started");
        persist(&self.tasks, &self.task).await;

        let outcome = self.run_steps().await;

        if let Err(e) = self.sink.shutdown().await {
            warn!(task_id = %self.task.id, error = %e, "Failed to close task log");
        }
        match &outcome {
            Ok(()) => info!(task_id = %self.task.id, "Task succeeded"),
            Err(failure) => warn!(task_id = %self.task.id, error = %failure, "Task failed"),
        }
        outcome
    }

    async fn run_steps(&mut self) -> TaskOutcome {
        let total = self.task.step_statuses.len();

        for index in 0..total {
            let name = self.task.step_statuses[index].step_name.clone();

            if let Some(reason) = self.ctx.done_reason() {
                return self.fail(index, reason.message(), reason.failure(&name)).await;
            }

            let Some(step) = self.steps.get(&name) else {
                let message = format!("step {} is not registered", name);
                let failure = TaskFailure::StepFailed {
                    step: name,
                    message: message.clone(),
                };
                return self.fail(index, &message, failure).await;
            };

            self.transition(|task| task.begin_step(index))?;
            persist(&self.tasks, &self.task).await;
            debug!(task_id = %self.task.id, step = %name, index, "Step running");

            let header = format!("==> [{}/{}] {}\n", index + 1, total, name);
            if let Err(e) = self.sink.write_all(header.as_bytes()).await {
                warn!(task_id = %self.task.id, error = %e, "Failed to write task log");
            }

            // Losing the race drops the step future, which aborts the step.
            let result = tokio::select! {
                result = step.run(&self.config, &mut *self.sink) => Ok(result),
                reason = self.ctx.done() => Err(reason),
            };

            match result {
                Ok(Ok(())) => {
                    self.transition(|task| task.complete_step(index))?;
                    persist(&self.tasks, &self.task).await;
                    debug!(task_id = %self.task.id, step = %name, "Step succeeded");
                }
                Ok(Err(e)) => {
                    let message = e.reason();
                    let failure = TaskFailure::StepFailed {
                        step: name,
                        message: message.clone(),
                    };
                    return self.fail(index, &message, failure).await;
                }
                Err(reason) => {
                    return self.fail(index, reason.message(), reason.failure(&name)).await;
                }
            }
        }

        self.transition(|task| task.succeed())?;
        persist(&self.tasks, &self.task).await;
        Ok(())
    }

    async fn fail(&mut self, index: usize, message: &str, failure: TaskFailure) -> TaskOutcome {
        self.transition(|task| task.fail_step(index, message))?;
        persist(&self.tasks, &self.task).await;
        Err(failure)
    }

    /// Apply a status transition the run loop guarantees to be legal.
    fn transition<F>(&mut self, f: F) -> TaskOutcome
    where
        F: FnOnce(&mut Task) -> AppResult<()>,
    {
        f(&mut self.task).map_err(|e| {
            error!(task_id = %self.task.id, error = %e, "Illegal task transition");
            TaskFailure::Aborted
        })
    }
}

/// Persist the current record. A failed write does not change the outcome.
async fn persist(tasks: &TaskRepository, task: &Task) {
    let _ = tasks
        .save(task)
        .await
        .log(format!("persisting task {}", task.id));
}
