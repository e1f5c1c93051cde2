//! Workflow registry.
//!
//! Maps a workflow kind to its ordered step names and a (provider, intent)
//! pair to a workflow kind. Built once at startup and shared read-only.

use kubefleet_steps::CloudProvider;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{AppError, AppResult};

pub const DIGITALOCEAN_DELETE_CLUSTER: &str = "DigitalOceanDeleteCluster";
pub const DIGITALOCEAN_DELETE_NODE: &str = "DigitalOceanDeleteNode";
pub const DIGITALOCEAN_PROVISION_NODE: &str = "DigitalOceanProvisionNode";

/// What a caller wants done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Intent {
    DeleteCluster,
    DeleteNode,
    ProvisionNode,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeleteCluster => write!(f, "DeleteCluster"),
            Self::DeleteNode => write!(f, "DeleteNode"),
            Self::ProvisionNode => write!(f, "ProvisionNode"),
        }
    }
}

/// Workflow kinds a single provider supports, by intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowSet {
    kinds: BTreeMap<Intent, String>,
}

impl WorkflowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style mapping of `intent` to `kind`.
    pub fn with(mut self, intent: Intent, kind: impl Into<String>) -> Self {
        self.kinds.insert(intent, kind.into());
        self
    }

    pub fn get(&self, intent: Intent) -> Option<&str> {
        self.kinds.get(&intent).map(|s| s.as_str())
    }

    fn merge(&mut self, other: WorkflowSet) {
        self.kinds.extend(other.kinds);
    }
}

/// Static table of workflows and per-provider workflow sets.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, Vec<String>>,
    providers: HashMap<CloudProvider, WorkflowSet>,
}

impl WorkflowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the workflows shipped with the control plane.
    ///
    /// Only the step names live here; the step implementations are supplied
    /// to the engine through its `StepRegistry`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register_workflow(
            DIGITALOCEAN_DELETE_CLUSTER,
            ["digitalocean.delete_cluster"],
        );
        registry.register_workflow(
            DIGITALOCEAN_DELETE_NODE,
            ["kubelet.drain", "digitalocean.delete_machine"],
        );
        registry.register_workflow(
            DIGITALOCEAN_PROVISION_NODE,
            [
                "digitalocean.create_machine",
                "node.ssh",
                "node.docker",
                "node.download_kubernetes",
                "node.certificates",
                "node.kubelet",
                "node.post_start",
            ],
        );

        registry.register_provider(
            CloudProvider::DigitalOcean,
            WorkflowSet::new()
                .with(Intent::DeleteCluster, DIGITALOCEAN_DELETE_CLUSTER)
                .with(Intent::DeleteNode, DIGITALOCEAN_DELETE_NODE)
                .with(Intent::ProvisionNode, DIGITALOCEAN_PROVISION_NODE),
        );

        registry
    }

    /// Register (or replace) a workflow kind.
    pub fn register_workflow<I, S>(&mut self, kind: &str, steps: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.workflows
            .insert(kind.to_string(), steps.into_iter().map(Into::into).collect());
    }

    /// Register a provider's workflow set, merged over any existing mapping.
    pub fn register_provider(&mut self, provider: CloudProvider, set: WorkflowSet) {
        self.providers.entry(provider).or_default().merge(set);
    }

    /// Resolve the workflow kind for `intent` on `provider`.
    ///
    /// `NotFound` means the provider does not support the intent; callers
    /// report it, they do not treat it as a fault.
    pub fn resolve(&self, provider: CloudProvider, intent: Intent) -> AppResult<&str> {
        self.providers
            .get(&provider)
            .and_then(|set| set.get(intent))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "provider {} does not support {}",
                    provider, intent
                ))
            })
    }

    /// Ordered step names of a workflow kind.
    pub fn steps(&self, kind: &str) -> AppResult<&[String]> {
        self.workflows
            .get(kind)
            .map(|s| s.as_slice())
            .ok_or_else(|| AppError::NotFound(format!("workflow kind {}", kind)))
    }

    /// Registered workflow kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.workflows.keys().map(|s| s.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }
}
