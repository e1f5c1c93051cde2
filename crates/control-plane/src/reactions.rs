//! Continuations attached to task completions.
//!
//! Follow-up work that depends on a task's outcome (dropping a deleted
//! cluster's records, removing a deleted node, activating a provisioned
//! node) is a [`Reaction`]. [`Continuations::attach`] waits for the task
//! and applies the reaction under a [`RetryPolicy`], returning a
//! [`ReactionReport`] instead of dropping failures on the floor.

use std::time::Duration;

use async_trait::async_trait;
use kubefleet_steps::NodeState;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::model::ClusterState;
use crate::services::ClusterService;
use crate::workflows::{Completion, TaskFailure, TaskRepository};

/// Work to do once a task reaches a terminal state.
///
/// Both callbacks may run more than once when they fail, so they should be
/// idempotent.
#[async_trait]
pub trait Reaction: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn on_success(&self) -> AppResult<()>;

    async fn on_failure(&self, failure: &TaskFailure) -> AppResult<()>;
}

/// Retry settings for reactions. Delays double up to `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.reaction_max_retries,
            initial_delay: Duration::from_millis(config.reaction_initial_delay_ms),
            max_delay: Duration::from_millis(config.reaction_max_delay_ms),
        }
    }

    /// Run once, never retry.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// What became of a reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionReport {
    Applied { attempts: u32 },
    Exhausted { attempts: u32, error: String },
}

impl ReactionReport {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Attaches reactions to completions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Continuations {
    policy: RetryPolicy,
}

impl Continuations {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Consume `completion` and apply `reaction` to its outcome.
    pub fn attach<R: Reaction>(&self, completion: Completion, reaction: R) -> JoinHandle<ReactionReport> {
        let policy = self.policy;
        tokio::spawn(async move {
            let task_id = completion.task_id().to_string();
            let outcome = completion.await;
            info!(
                task_id = %task_id,
                reaction = %reaction.name(),
                succeeded = outcome.is_ok(),
                "Task completed, applying reaction"
            );
            apply(&policy, &task_id, &reaction, &outcome).await
        })
    }
}

async fn apply<R: Reaction>(
    policy: &RetryPolicy,
    task_id: &str,
    reaction: &R,
    outcome: &Result<(), TaskFailure>,
) -> ReactionReport {
    let mut delay = policy.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = match outcome {
            Ok(()) => reaction.on_success().await,
            Err(failure) => reaction.on_failure(failure).await,
        };

        match result {
            Ok(()) => return ReactionReport::Applied { attempts: attempt },
            Err(e) if attempt <= policy.max_retries => {
                warn!(
                    task_id = %task_id,
                    reaction = %reaction.name(),
                    attempt,
                    max_retries = policy.max_retries,
                    error = %e,
                    "Reaction failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, policy.max_delay);
            }
            Err(e) => {
                error!(
                    task_id = %task_id,
                    reaction = %reaction.name(),
                    error = %e,
                    "Reaction failed after all retries"
                );
                return ReactionReport::Exhausted {
                    attempts: attempt,
                    error: e.to_string(),
                };
            }
        }
    }
}

/// Cluster deletion finished.
///
/// Success drops the cluster record and every task of the cluster; failure
/// marks the cluster failed.
pub struct ClusterDeleted {
    pub clusters: ClusterService,
    pub tasks: TaskRepository,
    pub cluster: String,
}

#[async_trait]
impl Reaction for ClusterDeleted {
    fn name(&self) -> &str {
        "cluster-deleted"
    }

    async fn on_success(&self) -> AppResult<()> {
        match self.clusters.delete(&self.cluster).await {
            Ok(()) => {}
            // an earlier attempt got this far
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let deleted = self.tasks.delete_for_cluster(&self.cluster).await?;
        info!(cluster = %self.cluster, tasks = deleted, "Cluster removed");
        Ok(())
    }

    async fn on_failure(&self, failure: &TaskFailure) -> AppResult<()> {
        warn!(cluster = %self.cluster, error = %failure, "Cluster deletion failed");
        self.clusters
            .update(&self.cluster, |kube| {
                kube.state = ClusterState::Failed;
                Ok(())
            })
            .await
            .map(|_| ())
    }
}

/// Node deletion finished.
///
/// Success removes the node from the cluster; failure keeps it, in state
/// `error`.
pub struct NodeDeleted {
    pub clusters: ClusterService,
    pub cluster: String,
    pub node: String,
}

#[async_trait]
impl Reaction for NodeDeleted {
    fn name(&self) -> &str {
        "node-deleted"
    }

    async fn on_success(&self) -> AppResult<()> {
        self.clusters
            .update(&self.cluster, |kube| {
                kube.nodes.remove(&self.node);
                Ok(())
            })
            .await?;
        info!(cluster = %self.cluster, node = %self.node, "Node removed from cluster");
        Ok(())
    }

    async fn on_failure(&self, failure: &TaskFailure) -> AppResult<()> {
        warn!(cluster = %self.cluster, node = %self.node, error = %failure, "Node deletion failed");
        set_node_state(&self.clusters, &self.cluster, &self.node, NodeState::Error).await
    }
}

/// Node provisioning finished: the node becomes `active` or `error`.
pub struct NodeProvisioned {
    pub clusters: ClusterService,
    pub cluster: String,
    pub node: String,
}

#[async_trait]
impl Reaction for NodeProvisioned {
    fn name(&self) -> &str {
        "node-provisioned"
    }

    async fn on_success(&self) -> AppResult<()> {
        set_node_state(&self.clusters, &self.cluster, &self.node, NodeState::Active).await
    }

    async fn on_failure(&self, failure: &TaskFailure) -> AppResult<()> {
        warn!(cluster = %self.cluster, node = %self.node, error = %failure, "Node provisioning failed");
        set_node_state(&self.clusters, &self.cluster, &self.node, NodeState::Error).await
    }
}

async fn set_node_state(
    clusters: &ClusterService,
    cluster: &str,
    node: &str,
    state: NodeState,
) -> AppResult<()> {
    clusters
        .update(cluster, |kube| {
            let entry = kube
                .nodes
                .get_mut(node)
                .ok_or_else(|| AppError::NotFound(format!("node {} in cluster {}", node, cluster)))?;
            entry.state = state;
            Ok(())
        })
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Kube;
    use crate::storage::MemoryStorage;
    use crate::workflows::Task;
    use kubefleet_steps::{Config, Node};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Flaky {
        failures_left: AtomicU32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Reaction for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn on_success(&self) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::Storage("unavailable".into()));
            }
            Ok(())
        }

        async fn on_failure(&self, _failure: &TaskFailure) -> AppResult<()> {
            Err(AppError::Internal("should not run".into()))
        }
    }

    fn flaky(failures: u32) -> (Flaky, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Flaky {
                failures_left: AtomicU32::new(failures),
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn test_reaction_retried_until_applied() {
        let (reaction, calls) = flaky(2);
        let report = Continuations::new(fast_policy(3))
            .attach(Completion::ready("t1", Ok(())), reaction)
            .await
            .unwrap();
        assert_eq!(report, ReactionReport::Applied { attempts: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_reaction_exhausted() {
        let (reaction, calls) = flaky(10);
        let report = Continuations::new(fast_policy(2))
            .attach(Completion::ready("t1", Ok(())), reaction)
            .await
            .unwrap();
        assert!(matches!(report, ReactionReport::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_outcome_runs_on_failure() {
        let (reaction, calls) = flaky(0);
        let report = Continuations::new(RetryPolicy::no_retry())
            .attach(Completion::ready("t1", Err(TaskFailure::Aborted)), reaction)
            .await
            .unwrap();
        assert!(!report.is_applied());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from_config(&AppConfig::default());
        assert_eq!(policy, RetryPolicy::default());
    }

    struct World {
        clusters: ClusterService,
        tasks: TaskRepository,
    }

    async fn world() -> World {
        let storage: Arc<dyn crate::storage::Storage> = Arc::new(MemoryStorage::new());
        let clusters = ClusterService::new(storage.clone());
        let mut kube: Kube = serde_json::from_value(serde_json::json!({
            "name": "prod",
            "accountName": "do-main",
            "region": "fra1"
        }))
        .unwrap();
        let mut node = Node::named("prod-node-1");
        node.state = NodeState::Provisioning;
        kube.nodes.insert(node.name.clone(), node);
        clusters.create(kube).await.unwrap();

        World {
            clusters,
            tasks: TaskRepository::new(storage),
        }
    }

    async fn save_task_for(tasks: &TaskRepository, cluster: &str) -> String {
        let mut task = Task::new("k", &["s"]);
        task.start(Config {
            cluster_name: cluster.to_string(),
            ..Default::default()
        })
        .unwrap();
        tasks.save(&task).await.unwrap();
        task.id
    }

    #[tokio::test]
    async fn test_cluster_deleted_success_removes_records() {
        let w = world().await;
        save_task_for(&w.tasks, "prod").await;
        save_task_for(&w.tasks, "prod").await;
        let other = save_task_for(&w.tasks, "staging").await;

        let reaction = ClusterDeleted {
            clusters: w.clusters.clone(),
            tasks: w.tasks.clone(),
            cluster: "prod".to_string(),
        };
        reaction.on_success().await.unwrap();
        // idempotent
        reaction.on_success().await.unwrap();

        assert!(w.clusters.get("prod").await.unwrap_err().is_not_found());
        assert!(w.tasks.list_by_cluster("prod").await.unwrap().is_empty());
        assert!(w.tasks.get(&other).await.is_ok());
    }

    #[tokio::test]
    async fn test_cluster_deleted_failure_marks_failed() {
        let w = world().await;
        let reaction = ClusterDeleted {
            clusters: w.clusters.clone(),
            tasks: w.tasks.clone(),
            cluster: "prod".to_string(),
        };
        reaction.on_failure(&TaskFailure::Aborted).await.unwrap();
        assert_eq!(w.clusters.get("prod").await.unwrap().state, ClusterState::Failed);
        assert!(w.tasks.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_node_deleted() {
        let w = world().await;
        let reaction = NodeDeleted {
            clusters: w.clusters.clone(),
            cluster: "prod".to_string(),
            node: "prod-node-1".to_string(),
        };

        reaction
            .on_failure(&TaskFailure::StepFailed {
                step: "digitalocean.delete_machine".into(),
                message: "quota exceeded".into(),
            })
            .await
            .unwrap();
        let kube = w.clusters.get("prod").await.unwrap();
        assert_eq!(kube.nodes["prod-node-1"].state, NodeState::Error);

        reaction.on_success().await.unwrap();
        assert!(!w.clusters.get("prod").await.unwrap().has_node("prod-node-1"));
    }

    #[tokio::test]
    async fn test_node_provisioned() {
        let w = world().await;
        let reaction = NodeProvisioned {
            clusters: w.clusters.clone(),
            cluster: "prod".to_string(),
            node: "prod-node-1".to_string(),
        };
        reaction.on_success().await.unwrap();
        let kube = w.clusters.get("prod").await.unwrap();
        assert_eq!(kube.nodes["prod-node-1"].state, NodeState::Active);

        let missing = NodeProvisioned {
            clusters: w.clusters.clone(),
            cluster: "prod".to_string(),
            node: "ghost".to_string(),
        };
        assert!(missing.on_success().await.unwrap_err().is_not_found());
    }
}
