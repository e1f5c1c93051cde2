//! Shared state of the cluster routes.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::provisioner::NodeProvisioner;
use crate::reactions::Continuations;
use crate::services::{AccountGetter, ClusterService};
use crate::workflows::{RunContext, TaskEngine};

/// Everything the cluster handlers need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub clusters: ClusterService,
    pub accounts: Arc<dyn AccountGetter>,
    pub engine: TaskEngine,
    pub provisioner: NodeProvisioner,
    pub continuations: Continuations,
    /// Cancelled on shutdown; every task run gets a child token.
    pub shutdown: CancellationToken,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        clusters: ClusterService,
        accounts: Arc<dyn AccountGetter>,
        engine: TaskEngine,
        continuations: Continuations,
    ) -> Self {
        let provisioner =
            NodeProvisioner::new(engine.clone(), clusters.clone()).with_reactions(continuations);
        Self {
            config: Arc::new(config),
            clusters,
            accounts,
            engine,
            provisioner,
            continuations,
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        }
    }

    /// Run context for a new task, cancelled on shutdown.
    pub fn run_context(&self) -> RunContext {
        RunContext::with_token(self.shutdown.child_token())
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
