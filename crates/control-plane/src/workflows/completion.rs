//! Run context and the one-shot completion signal of a task run.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Terminal failure of a task run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskFailure {
    /// A step reported failure.
    #[error("step {step} failed: {message}")]
    StepFailed { step: String, message: String },

    /// The run was cancelled while `step` was pending or running.
    #[error("step {step} cancelled")]
    Cancelled { step: String },

    /// The run's deadline expired while `step` was pending or running.
    #[error("step {step} deadline exceeded")]
    DeadlineExceeded { step: String },

    /// The task was not pending when asked to run.
    #[error("task {0} already started")]
    AlreadyStarted(String),

    /// The engine went away without reporting an outcome.
    #[error("task run aborted")]
    Aborted,
}

impl TaskFailure {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }
}

/// Outcome delivered through a [`Completion`].
pub type TaskOutcome = Result<(), TaskFailure>;

/// Cancellation token plus optional deadline for one task run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context cancelled through `token`.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Add a deadline `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Token that cancels this run.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel the run.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Why the context is done, if it is.
    pub(crate) fn done_reason(&self) -> Option<DoneReason> {
        if self.token.is_cancelled() {
            Some(DoneReason::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(DoneReason::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub(crate) async fn done(&self) -> DoneReason {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => DoneReason::Cancelled,
                _ = tokio::time::sleep_until(deadline) => DoneReason::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                DoneReason::Cancelled
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DoneReason {
    Cancelled,
    DeadlineExceeded,
}

impl DoneReason {
    pub(crate) fn message(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline exceeded",
        }
    }

    pub(crate) fn failure(&self, step: &str) -> TaskFailure {
        match self {
            Self::Cancelled => TaskFailure::Cancelled {
                step: step.to_string(),
            },
            Self::DeadlineExceeded => TaskFailure::DeadlineExceeded {
                step: step.to_string(),
            },
        }
    }
}

/// Single-consumer completion signal of one task run.
///
/// Awaiting it yields the terminal outcome exactly once. Dropping it is
/// fine: the engine never waits for a reader, and the outcome stays visible
/// on the persisted task record.
#[derive(Debug)]
pub struct Completion {
    task_id: String,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl Completion {
    pub(crate) fn channel(task_id: &str) -> (CompletionSender, Self) {
        let (tx, rx) = oneshot::channel();
        (
            CompletionSender { tx },
            Self {
                task_id: task_id.to_string(),
                rx,
            },
        )
    }

    /// A completion that is already resolved.
    #[cfg(test)]
    pub(crate) fn ready(task_id: &str, outcome: TaskOutcome) -> Self {
        let (tx, completion) = Self::channel(task_id);
        tx.send(outcome);
        completion
    }

    /// Id of the task this completion belongs to.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl Future for Completion {
    type Output = TaskOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskFailure::Aborted)))
    }
}

/// Engine side of a [`Completion`].
#[derive(Debug)]
pub(crate) struct CompletionSender {
    tx: oneshot::Sender<TaskOutcome>,
}

impl CompletionSender {
    /// Deliver the outcome. Never blocks; a dropped receiver is ignored.
    pub(crate) fn send(self, outcome: TaskOutcome) {
        let _ = self.tx.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_delivers_outcome() {
        let (tx, completion) = Completion::channel("t1");
        assert_eq!(completion.task_id(), "t1");
        tx.send(Ok(()));
        assert_eq!(completion.await, Ok(()));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_aborted() {
        let (tx, completion) = Completion::channel("t1");
        drop(tx);
        assert_eq!(completion.await, Err(TaskFailure::Aborted));
    }

    #[test]
    fn test_send_without_receiver_does_not_block() {
        let (tx, completion) = Completion::channel("t1");
        drop(completion);
        tx.send(Err(TaskFailure::Aborted));
    }

    #[tokio::test]
    async fn test_ready_completion() {
        let completion = Completion::ready("t2", Err(TaskFailure::AlreadyStarted("t2".into())));
        assert_eq!(
            completion.await,
            Err(TaskFailure::AlreadyStarted("t2".into()))
        );
    }

    #[test]
    fn test_context_done_reason() {
        let ctx = RunContext::background();
        assert_eq!(ctx.done_reason(), None);
        ctx.cancel();
        assert_eq!(ctx.done_reason(), Some(DoneReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_deadline() {
        let ctx = RunContext::background().with_timeout(Duration::from_secs(5));
        assert_eq!(ctx.done_reason(), None);
        assert_eq!(ctx.done().await, DoneReason::DeadlineExceeded);
        assert_eq!(ctx.done_reason(), Some(DoneReason::DeadlineExceeded));
    }

    #[test]
    fn test_failure_display() {
        let failure = TaskFailure::StepFailed {
            step: "digitalocean.delete_machine".into(),
            message: "quota exceeded".into(),
        };
        assert_eq!(
            failure.to_string(),
            "step digitalocean.delete_machine failed: quota exceeded"
        );
        assert!(!failure.is_cancellation());
        assert!(TaskFailure::Cancelled { step: "x".into() }.is_cancellation());
    }
}
