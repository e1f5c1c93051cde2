//! Cluster record.

use kubefleet_steps::{ClusterProfile, CloudProvider, Node};
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};

/// Lifecycle state of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    #[default]
    Provisioning,
    Operational,
    Deleting,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Networking {
    #[serde(rename = "type", default)]
    pub network_type: String,
    #[serde(default)]
    pub cidr: String,
    #[serde(default)]
    pub version: String,
}

/// A Kubernetes cluster managed by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kube {
    pub name: String,
    pub account_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<CloudProvider>,
    pub region: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub operating_system_version: String,
    #[serde(default)]
    pub docker_version: String,
    #[serde(rename = "K8SVersion", default)]
    pub k8s_version: String,
    #[serde(default)]
    pub helm_version: String,
    #[serde(default)]
    pub networking: Networking,
    #[serde(default)]
    pub rbac_enabled: bool,
    #[serde(default)]
    pub masters: BTreeMap<String, Node>,
    #[serde(default)]
    pub nodes: BTreeMap<String, Node>,
    #[serde(default)]
    pub state: ClusterState,
    /// Bumped on every stored write; compared on whole-record replace.
    #[serde(default)]
    pub version: u64,
}

impl Kube {
    /// Check the fields a client must supply.
    pub fn validate(&self) -> AppResult<()> {
        if !is_dns_label(&self.name) {
            return Err(AppError::Validation(format!(
                "cluster name {:?} must be a lowercase DNS label",
                self.name
            )));
        }
        if self.account_name.trim().is_empty() {
            return Err(AppError::Validation("accountName is required".to_string()));
        }
        if self.region.trim().is_empty() {
            return Err(AppError::Validation("region is required".to_string()));
        }
        Ok(())
    }

    /// Cluster settings handed to steps, for `provider`.
    pub fn profile(&self, provider: CloudProvider) -> ClusterProfile {
        ClusterProfile {
            provider: Some(provider),
            region: self.region.clone(),
            arch: self.arch.clone(),
            operating_system: self.operating_system.clone(),
            operating_system_version: self.operating_system_version.clone(),
            docker_version: self.docker_version.clone(),
            k8s_version: self.k8s_version.clone(),
            helm_version: self.helm_version.clone(),
            network_type: self.networking.network_type.clone(),
            cidr: self.networking.cidr.clone(),
            flannel_version: self.networking.version.clone(),
            rbac_enabled: self.rbac_enabled,
        }
    }

    /// Any one master, picked at random.
    pub fn random_master(&self) -> Option<&Node> {
        self.masters.values().choose(&mut rand::thread_rng())
    }

    pub fn is_master(&self, name: &str) -> bool {
        self.masters.contains_key(name)
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }
}

fn is_dns_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
