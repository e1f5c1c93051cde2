//! Step contract and registry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::StepError;

/// Destination for a step's output.
pub type OutputSink = dyn tokio::io::AsyncWrite + Send + Unpin;

/// A single unit of remote work belonging to a workflow.
///
/// Implementations should be as idempotent as the provider allows. A step is
/// cancelled by dropping its future, so anything it spawns must die with it.
#[async_trait]
pub trait Step: Send + Sync {
    /// Unique step name, as referenced by workflows.
    fn name(&self) -> &str;

    /// Run the step against `config`, writing progress to `out`.
    async fn run(&self, config: &Config, out: &mut OutputSink) -> Result<(), StepError>;
}

/// Registry of available steps.
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn Step>>,
}

impl StepRegistry {
    /// Create a new empty step registry.
    pub fn new() -> Self {
        Self {
            steps: HashMap::new(),
        }
    }

    /// Register a step. A step with the same name is replaced.
    pub fn register<S: Step + 'static>(&mut self, step: S) {
        self.register_arc(Arc::new(step));
    }

    /// Register an already shared step.
    pub fn register_arc(&mut self, step: Arc<dyn Step>) {
        let name = step.name().to_string();
        if self.steps.insert(name.clone(), step).is_some() {
            tracing::warn!(step = %name, "Step re-registered, previous definition replaced");
        }
    }

    /// Get a step by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Step>> {
        self.steps.get(name).cloned()
    }

    /// Check if a step is registered.
    pub fn has(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// List all registered step names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.steps.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Resolve an ordered list of step names.
    ///
    /// Fails on the first name that is not registered.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn Step>>, StepError> {
        names
            .iter()
            .map(|name| {
                self.get(name.as_ref())
                    .ok_or_else(|| StepError::NotFound(name.as_ref().to_string()))
            })
            .collect()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.list())
            .finish()
    }
}
