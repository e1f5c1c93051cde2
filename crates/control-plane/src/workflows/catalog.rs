//! Workflow catalog file.
//!
//! Declares shell steps, workflows and provider workflow sets in YAML so
//! operators can add providers without rebuilding the control plane:
//!
//! ```yaml
//! apiVersion: kubefleet.io/v1
//! kind: WorkflowCatalog
//! steps:
//!   - name: aws.delete_cluster
//!     command: ./scripts/aws-delete-cluster.sh {{ clusterName | shell_quote }}
//!     env:
//!       AWS_ACCESS_KEY_ID: "{{ credentials.access_key }}"
//! workflows:
//!   AwsDeleteCluster: [aws.delete_cluster]
//! providers:
//!   aws:
//!     DeleteCluster: AwsDeleteCluster
//! ```

use kubefleet_steps::{CloudProvider, ShellStep, ShellStepSpec, StepRegistry};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{AppError, AppResult};

use super::registry::{WorkflowRegistry, WorkflowSet};

const API_VERSION: &str = "kubefleet.io/v1";
const KIND: &str = "WorkflowCatalog";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCatalog {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub steps: Vec<ShellStepSpec>,
    #[serde(default)]
    pub workflows: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub providers: BTreeMap<CloudProvider, WorkflowSet>,
}

impl WorkflowCatalog {
    /// Parse and validate a catalog document.
    pub fn from_yaml(content: &str) -> AppResult<Self> {
        let catalog: WorkflowCatalog = serde_yaml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub async fn from_file(path: &Path) -> AppResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::Config(format!("read catalog {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    fn validate(&self) -> AppResult<()> {
        if self.api_version != API_VERSION {
            return Err(AppError::Config(format!(
                "Unsupported catalog apiVersion: {}. Expected {}",
                self.api_version, API_VERSION
            )));
        }
        if self.kind != KIND {
            return Err(AppError::Config(format!(
                "Invalid catalog kind: {}. Expected {}",
                self.kind, KIND
            )));
        }
        if let Some((kind, _)) = self.workflows.iter().find(|(_, steps)| steps.is_empty()) {
            return Err(AppError::Config(format!("workflow {} has no steps", kind)));
        }
        Ok(())
    }

    /// Register the catalog's steps and workflows on top of what is there.
    ///
    /// Workflows may name steps registered elsewhere; unknown names surface
    /// when a task of that workflow is created.
    pub fn apply(self, steps: &mut StepRegistry, workflows: &mut WorkflowRegistry) {
        for spec in self.steps {
            tracing::info!(step = %spec.name, "Registering catalog step");
            steps.register(ShellStep::new(spec));
        }
        for (kind, names) in self.workflows {
            tracing::info!(kind = %kind, steps = names.len(), "Registering catalog workflow");
            workflows.register_workflow(&kind, names);
        }
        for (provider, set) in self.providers {
            workflows.register_provider(provider, set);
        }
    }
}
