//! Workflow registry, task records and the task engine.

pub mod catalog;
pub mod completion;
pub mod engine;
pub mod logsink;
pub mod registry;
pub mod repository;
pub mod task;

pub use catalog::WorkflowCatalog;
pub use completion::{Completion, RunContext, TaskFailure, TaskOutcome};
pub use engine::TaskEngine;
pub use logsink::{DiscardLogSinks, FileLogSinks, LogSinks};
pub use registry::{Intent, WorkflowRegistry, WorkflowSet};
pub use repository::{TaskRepository, TASK_PREFIX};
pub use task::{StepState, StepStatus, Task, TaskStatus};
