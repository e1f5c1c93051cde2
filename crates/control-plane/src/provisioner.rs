//! Node provisioning fan-out.

use kubefleet_steps::{CloudProvider, Config, Node, NodeProfile, NodeRole, NodeState};
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::model::Kube;
use crate::reactions::{Continuations, NodeProvisioned};
use crate::services::ClusterService;
use crate::workflows::{Completion, Intent, RunContext, TaskEngine};

/// A node whose provisioning task is running.
#[derive(Debug)]
pub struct StartedNode {
    pub node: Node,
    pub task_id: String,
    pub completion: Completion,
}

/// Starts one provisioning task per requested node.
#[derive(Clone)]
pub struct NodeProvisioner {
    engine: TaskEngine,
    clusters: ClusterService,
    continuations: Option<Continuations>,
}

impl NodeProvisioner {
    pub fn new(engine: TaskEngine, clusters: ClusterService) -> Self {
        Self {
            engine,
            clusters,
            continuations: None,
        }
    }

    /// Attach the node-provisioned reaction to every task started by
    /// [`NodeProvisioner::provision_nodes`].
    pub fn with_reactions(mut self, continuations: Continuations) -> Self {
        self.continuations = Some(continuations);
        self
    }

    /// Start a provisioning task per profile and return the started nodes.
    ///
    /// Stops at the first profile whose task cannot be created; tasks already
    /// started keep running.
    pub async fn start_nodes(
        &self,
        ctx: &RunContext,
        profiles: &[NodeProfile],
        kube: &Kube,
        config: &Config,
    ) -> AppResult<Vec<StartedNode>> {
        let kind = self.provision_kind(profiles, kube, config)?;
        let mut started = Vec::with_capacity(profiles.len());
        for profile in profiles {
            started.push(self.start_node(ctx, &kind, profile, kube, config).await?);
        }
        Ok(started)
    }

    /// Provision one node per profile and return the task ids.
    ///
    /// Returns as soon as every task has been started. Each node is recorded
    /// on the cluster in state `provisioning`.
    ///
    /// Stops at the first node whose task cannot be started or recorded.
    /// Tasks already started keep running with their reactions attached.
    pub async fn provision_nodes(
        &self,
        ctx: &RunContext,
        profiles: &[NodeProfile],
        kube: &Kube,
        config: &Config,
    ) -> AppResult<Vec<String>> {
        let kind = self.provision_kind(profiles, kube, config)?;
        let mut task_ids = Vec::with_capacity(profiles.len());

        for profile in profiles {
            let started = match self.start_node(ctx, &kind, profile, kube, config).await {
                Ok(started) => started,
                Err(e) => {
                    if !task_ids.is_empty() {
                        error!(
                            cluster = %kube.name,
                            started = ?task_ids,
                            error = %e,
                            "Node provisioning stopped part way"
                        );
                    }
                    return Err(e);
                }
            };

            let node = started.node.clone();
            let recorded = self
                .clusters
                .update(&kube.name, |k| {
                    k.nodes.insert(node.name.clone(), node);
                    Ok(())
                })
                .await;

            task_ids.push(started.task_id.clone());
            match self.continuations {
                Some(continuations) => {
                    continuations.attach(
                        started.completion,
                        NodeProvisioned {
                            clusters: self.clusters.clone(),
                            cluster: kube.name.clone(),
                            node: started.node.name,
                        },
                    );
                }
                None => drop(started.completion),
            }

            if let Err(e) = recorded {
                error!(
                    cluster = %kube.name,
                    task_id = %started.task_id,
                    started = ?task_ids,
                    error = %e,
                    "Node task started but not recorded on the cluster"
                );
                return Err(e);
            }
        }

        info!(cluster = %kube.name, nodes = task_ids.len(), "Node provisioning started");
        Ok(task_ids)
    }

    fn provision_kind(&self, profiles: &[NodeProfile], kube: &Kube, config: &Config) -> AppResult<String> {
        if profiles.is_empty() {
            return Err(AppError::Validation("at least one node profile is required".to_string()));
        }
        let provider = provider_of(kube, config)?;
        Ok(self
            .engine
            .workflows()
            .resolve(provider, Intent::ProvisionNode)?
            .to_string())
    }

    async fn start_node(
        &self,
        ctx: &RunContext,
        kind: &str,
        profile: &NodeProfile,
        kube: &Kube,
        config: &Config,
    ) -> AppResult<StartedNode> {
        let node = Node {
            name: node_name(&kube.name),
            role: NodeRole::Node,
            state: NodeState::Provisioning,
            provider: config.provider.or(kube.provider),
            region: kube.region.clone(),
            size: profile.size.clone(),
            created_at: Some(chrono::Utc::now()),
            ..Default::default()
        };

        let node_config = config.for_node(node.clone(), profile.clone());
        let completion = self.engine.launch(kind, ctx.clone(), node_config).await?;
        let task_id = completion.task_id().to_string();
        info!(cluster = %kube.name, node = %node.name, task_id = %task_id, "Provisioning node");

        Ok(StartedNode {
            node,
            task_id,
            completion,
        })
    }
}

fn provider_of(kube: &Kube, config: &Config) -> AppResult<CloudProvider> {
    config
        .provider
        .or(kube.provider)
        .ok_or_else(|| AppError::Validation(format!("cluster {} has no cloud provider", kube.name)))
}

/// `<cluster>-node-<8 hex digits>`.
fn node_name(cluster: &str) -> String {
    format!("{}-node-{:08x}", cluster, rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactions::RetryPolicy;
    use crate::storage::{MemoryStorage, Storage};
    use crate::workflows::{
        DiscardLogSinks, LogSinks, TaskRepository, TaskStatus, WorkflowRegistry, WorkflowSet,
    };
    use async_trait::async_trait;
    use kubefleet_steps::{OutputSink, Step, StepError, StepRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Noop(&'static str);

    #[async_trait]
    impl Step for Noop {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self, config: &Config, _out: &mut OutputSink) -> Result<(), StepError> {
            match &config.node {
                Some(node) if node.name.contains("-node-") => Ok(()),
                _ => Err(StepError::ExecutionFailed("no node in config".into())),
            }
        }
    }

    /// Opens `limit` sinks, then fails.
    struct LimitedSinks {
        opened: AtomicUsize,
        limit: usize,
    }

    #[async_trait]
    impl LogSinks for LimitedSinks {
        async fn open(&self, task_id: &str) -> AppResult<Box<OutputSink>> {
            if self.opened.fetch_add(1, Ordering::SeqCst) >= self.limit {
                return Err(AppError::Storage(format!("log for {} unavailable", task_id)));
            }
            Ok(Box::new(tokio::io::sink()))
        }
    }

    async fn setup() -> (NodeProvisioner, ClusterService, TaskRepository, Kube) {
        setup_with(Arc::new(DiscardLogSinks)).await
    }

    async fn setup_with(
        sinks: Arc<dyn LogSinks>,
    ) -> (NodeProvisioner, ClusterService, TaskRepository, Kube) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());

        let mut steps = StepRegistry::new();
        steps.register(Noop("create_machine"));
        steps.register(Noop("kubelet"));
        let mut workflows = WorkflowRegistry::new();
        workflows.register_workflow("DoProvision", ["create_machine", "kubelet"]);
        workflows.register_provider(
            CloudProvider::DigitalOcean,
            WorkflowSet::new().with(Intent::ProvisionNode, "DoProvision"),
        );
        workflows.register_provider(
            CloudProvider::Aws,
            WorkflowSet::new().with(Intent::ProvisionNode, "AwsProvision"),
        );

        let tasks = TaskRepository::new(storage.clone());
        let engine = TaskEngine::new(
            Arc::new(workflows),
            Arc::new(steps),
            tasks.clone(),
            sinks,
        );
        let clusters = ClusterService::new(storage);
        let kube: Kube = serde_json::from_value(serde_json::json!({
            "name": "prod",
            "accountName": "do-main",
            "provider": "digitalocean",
            "region": "fra1"
        }))
        .unwrap();
        let kube = clusters.create(kube).await.unwrap();

        (NodeProvisioner::new(engine, clusters.clone()), clusters, tasks, kube)
    }

    fn profiles(n: usize) -> Vec<NodeProfile> {
        (0..n)
            .map(|i| NodeProfile {
                size: format!("s-{}vcpu", i + 1),
                ..Default::default()
            })
            .collect()
    }

    fn config() -> Config {
        Config {
            cluster_name: "prod".to_string(),
            provider: Some(CloudProvider::DigitalOcean),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_nodes_runs_one_task_per_profile() {
        let (provisioner, _, tasks, kube) = setup().await;
        let started = provisioner
            .start_nodes(&RunContext::background(), &profiles(3), &kube, &config())
            .await
            .unwrap();
        assert_eq!(started.len(), 3);

        let mut names = std::collections::HashSet::new();
        for node in started {
            assert!(node.node.name.starts_with("prod-node-"));
            assert_eq!(node.node.name.len(), "prod-node-".len() + 8);
            assert_eq!(node.node.state, NodeState::Provisioning);
            assert!(names.insert(node.node.name.clone()));
            assert_eq!(node.completion.await, Ok(()));

            let task = tasks.get(&node.task_id).await.unwrap();
            assert_eq!(task.status, TaskStatus::Success);
            assert_eq!(task.config.unwrap().node.unwrap().name, node.node.name);
        }
    }

    #[tokio::test]
    async fn test_provision_nodes_registers_and_activates() {
        let (provisioner, clusters, tasks, kube) = setup().await;
        let provisioner = provisioner.with_reactions(Continuations::new(RetryPolicy::no_retry()));

        let ids = provisioner
            .provision_nodes(&RunContext::background(), &profiles(2), &kube, &config())
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(clusters.get("prod").await.unwrap().nodes.len(), 2);

        let mut active = 0;
        for _ in 0..200 {
            let kube = clusters.get("prod").await.unwrap();
            active = kube
                .nodes
                .values()
                .filter(|n| n.state == NodeState::Active)
                .count();
            if active == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(active, 2);
        assert_eq!(tasks.list_by_cluster("prod").await.unwrap().len(), 2);
    }

    async fn wait_terminal(tasks: &TaskRepository, id: &str) -> TaskStatus {
        let mut status = TaskStatus::Pending;
        for _ in 0..200 {
            status = tasks.get(id).await.unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        status
    }

    #[tokio::test]
    async fn test_second_node_failure_keeps_first_running() {
        let sinks = Arc::new(LimitedSinks {
            opened: AtomicUsize::new(0),
            limit: 1,
        });
        let (provisioner, clusters, tasks, kube) = setup_with(sinks).await;
        let provisioner = provisioner.with_reactions(Continuations::new(RetryPolicy::no_retry()));

        let result = provisioner
            .provision_nodes(&RunContext::background(), &profiles(2), &kube, &config())
            .await;
        assert!(matches!(result, Err(AppError::Storage(_))));

        let all = tasks.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(wait_terminal(&tasks, &all[0].id).await, TaskStatus::Success);

        let mut node_state = None;
        for _ in 0..200 {
            let kube = clusters.get("prod").await.unwrap();
            assert_eq!(kube.nodes.len(), 1);
            node_state = kube.nodes.values().next().map(|n| n.state);
            if node_state == Some(NodeState::Active) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(node_state, Some(NodeState::Active));
    }

    #[tokio::test]
    async fn test_unrecorded_node_still_runs_its_task() {
        let (provisioner, clusters, tasks, mut kube) = setup().await;
        let provisioner = provisioner.with_reactions(Continuations::new(RetryPolicy::no_retry()));
        kube.name = "gone".to_string();
        let mut config = config();
        config.cluster_name = "gone".to_string();

        let result = provisioner
            .provision_nodes(&RunContext::background(), &profiles(2), &kube, &config)
            .await;
        assert!(result.unwrap_err().is_not_found());

        // stopped after the first node
        let all = tasks.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(wait_terminal(&tasks, &all[0].id).await, TaskStatus::Success);
        assert!(clusters.get("gone").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_empty_profiles_rejected() {
        let (provisioner, _, tasks, kube) = setup().await;
        let result = provisioner
            .provision_nodes(&RunContext::background(), &[], &kube, &config())
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(tasks.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_provider_not_found() {
        let (provisioner, _, _, kube) = setup().await;
        let mut config = config();
        config.provider = Some(CloudProvider::Gce);
        let result = provisioner
            .provision_nodes(&RunContext::background(), &profiles(1), &kube, &config)
            .await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unregistered_workflow_fails_fast() {
        let (provisioner, clusters, tasks, kube) = setup().await;
        let mut config = config();
        config.provider = Some(CloudProvider::Aws);
        let result = provisioner
            .provision_nodes(&RunContext::background(), &profiles(2), &kube, &config)
            .await;
        assert!(result.unwrap_err().is_not_found());
        assert!(tasks.list_all().await.unwrap().is_empty());
        assert!(clusters.get("prod").await.unwrap().nodes.is_empty());
    }
}
