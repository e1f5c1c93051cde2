//! Run configuration handed to every step of a task.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{CloudProvider, Node, NodeProfile, NodeRole};

/// Cluster-wide settings a step may need to build or tear down machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<CloudProvider>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub operating_system_version: String,
    #[serde(default)]
    pub docker_version: String,
    #[serde(default)]
    pub k8s_version: String,
    #[serde(default)]
    pub helm_version: String,
    #[serde(default)]
    pub network_type: String,
    #[serde(default)]
    pub cidr: String,
    #[serde(default)]
    pub flannel_version: String,
    #[serde(default)]
    pub rbac_enabled: bool,
}

/// Snapshot of everything the steps of one task need.
///
/// A `Config` is captured when a task starts running and is never written
/// again; later changes to the cluster record do not reach it. Credentials
/// are available to steps but are skipped when the owning task record is
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub cluster_name: String,

    pub cloud_account_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<CloudProvider>,

    /// Resolved cloud account credentials.
    #[serde(default, skip_serializing)]
    pub credentials: BTreeMap<String, String>,

    #[serde(default)]
    pub profile: ClusterProfile,

    /// Target node for node-scoped workflows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<Node>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_profile: Option<NodeProfile>,

    #[serde(default)]
    pub masters: Vec<Node>,
}

impl Config {
    /// Create a config for a cluster-scoped workflow.
    pub fn new(
        cluster_name: impl Into<String>,
        cloud_account_name: impl Into<String>,
        profile: ClusterProfile,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            cloud_account_name: cloud_account_name.into(),
            provider: profile.provider,
            profile,
            ..Default::default()
        }
    }

    /// Record a master the steps can reach (join token, kubeconfig, ...).
    pub fn add_master(&mut self, mut node: Node) {
        node.role = NodeRole::Master;
        self.masters.push(node);
    }

    /// Target a single node.
    pub fn with_node(mut self, node: Node) -> Self {
        self.node = Some(node);
        self
    }

    /// Derive the per-node config used when provisioning one node.
    ///
    /// The shared part (cluster, account, credentials, masters) is cloned;
    /// the node and its requested profile replace whatever was there.
    pub fn for_node(&self, node: Node, profile: NodeProfile) -> Self {
        let mut config = self.clone();
        config.node = Some(node);
        config.node_profile = Some(profile);
        config
    }

    /// Get a credential value.
    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials.get(key).map(|s| s.as_str())
    }

    /// JSON view of the config for template rendering, credentials included.
    pub fn template_context(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        if let serde_json::Value::Object(map) = &mut value {
            map.insert(
                "credentials".to_string(),
                serde_json::to_value(&self.credentials).unwrap_or_default(),
            );
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        let profile = ClusterProfile {
            provider: Some(CloudProvider::DigitalOcean),
            region: "fra1".to_string(),
            k8s_version: "1.29.4".to_string(),
            ..Default::default()
        };
        let mut config = Config::new("prod", "do-main", profile);
        config
            .credentials
            .insert("accessToken".to_string(), "secret-token".to_string());
        config
    }

    #[test]
    fn test_new_copies_provider_from_profile() {
        let config = sample();
        assert_eq!(config.provider, Some(CloudProvider::DigitalOcean));
        assert_eq!(config.cluster_name, "prod");
    }

    #[test]
    fn test_credentials_not_serialized() {
        let config = sample();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(json.contains("\"clusterName\":\"prod\""));
    }

    #[test]
    fn test_template_context_includes_credentials() {
        let config = sample();
        let ctx = config.template_context();
        assert_eq!(ctx["credentials"]["accessToken"], "secret-token");
        assert_eq!(ctx["profile"]["region"], "fra1");
    }

    #[test]
    fn test_for_node_substitutes_node_slice() {
        let mut shared = sample();
        shared.add_master(Node::named("master-1"));

        let profile = NodeProfile {
            size: "s-4vcpu-8gb".to_string(),
            ..Default::default()
        };
        let per_node = shared.for_node(Node::named("prod-node-1"), profile.clone());

        assert_eq!(per_node.node.as_ref().unwrap().name, "prod-node-1");
        assert_eq!(per_node.node_profile, Some(profile));
        assert_eq!(per_node.masters.len(), 1);
        assert_eq!(per_node.masters[0].role, NodeRole::Master);
        assert_eq!(per_node.credential("accessToken"), Some("secret-token"));
        assert!(shared.node.is_none());
    }
}
