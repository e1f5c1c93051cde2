//! KubeFleet Control Plane Library
//!
//! This crate provides the control plane server for KubeFleet, handling:
//!
//! - **Cluster Records**: Register, inspect and delete Kubernetes clusters and their certificate bundles
//! - **Cloud Accounts**: Store provider credentials used by cluster tasks
//! - **Task Execution**: Run named workflows of steps with per-task logs
//! - **Reactions**: Update cluster records once a task finishes
//!
//! ## Architecture
//!
//! Every long-running operation is a [`workflows::Task`]: an ordered list of
//! steps run in the background by the [`workflows::TaskEngine`]. Handlers
//! return as soon as a task is launched and attach a reaction to its
//! completion; the reaction writes the final cluster state.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`error`]: Custom error types with Axum integration
//! - [`handlers`]: HTTP route handlers
//! - [`model`]: Cluster and account records
//! - [`provisioner`]: Concurrent node provisioning
//! - [`reactions`]: Completion reactions with retry
//! - [`services`]: Cluster and account services over storage
//! - [`state`]: Shared application state
//! - [`storage`]: Key-value storage backends
//! - [`workflows`]: Task model, engine and workflow registry
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kubefleet_control_plane::{
//!     config::AppConfig,
//!     reactions::{Continuations, RetryPolicy},
//!     services::{AccountService, ClusterService},
//!     state::AppState,
//!     storage::{MemoryStorage, Storage},
//!     workflows::{FileLogSinks, TaskEngine, TaskRepository, WorkflowRegistry},
//! };
//! use kubefleet_steps::StepRegistry;
//!
//! let config = AppConfig::default();
//! let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
//! let engine = TaskEngine::new(
//!     Arc::new(WorkflowRegistry::builtin()),
//!     Arc::new(StepRegistry::new()),
//!     TaskRepository::new(storage.clone()),
//!     Arc::new(FileLogSinks::new(&config.log_dir)),
//! );
//! let accounts = AccountService::new(storage.clone());
//! let state = AppState::new(
//!     config.clone(),
//!     ClusterService::new(storage),
//!     Arc::new(accounts.clone()),
//!     engine,
//!     Continuations::new(RetryPolicy::from_config(&config)),
//! );
//! let app = kubefleet_control_plane::handlers::router(state, accounts);
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod provisioner;
pub mod reactions;
pub mod result_ext;
pub mod services;
pub mod state;
pub mod storage;
pub mod workflows;

pub use error::{AppError, AppResult};
pub use result_ext::ResultExt;
