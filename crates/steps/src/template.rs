//! Template engine implementation using minijinja.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use crate::error::StepError;

/// Template engine with Jinja2-compatible syntax.
///
/// Undefined variables are an error: a command rendered with a silently
/// empty cluster name is worse than a failed step.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create a new template engine with custom filters.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_filter("shell_quote", filter_shell_quote);

        Self { env }
    }

    /// Render a template string with the given context.
    pub fn render<S: Serialize>(&self, template: &str, context: S) -> Result<String, StepError> {
        if !Self::is_template(template) {
            return Ok(template.to_string());
        }
        self.env
            .render_str(template, context)
            .map_err(|e| StepError::Template(e.to_string()))
    }

    /// Check if a string contains template syntax.
    pub fn is_template(s: &str) -> bool {
        s.contains("{{") || s.contains("{%")
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Quote a value for safe interpolation into a POSIX shell command.
fn filter_shell_quote(value: String) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
