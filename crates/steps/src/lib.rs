//! KubeFleet Step Library
//!
//! Everything a provisioning step can see and everything the control plane
//! needs to run one.
//!
//! This crate provides:
//! - The [`Step`] contract and the [`StepRegistry`] that resolves step names
//! - The run configuration snapshot ([`Config`]) handed to every step
//! - Shared cluster model types ([`Node`], [`NodeProfile`], [`CloudProvider`])
//! - A generic [`ShellStep`] driven by command templates

pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod shell;
pub mod template;

pub use config::{ClusterProfile, Config};
pub use error::StepError;
pub use model::{CloudProvider, Node, NodeProfile, NodeRole, NodeState};
pub use registry::{OutputSink, Step, StepRegistry};
pub use shell::{ShellStep, ShellStepSpec};
pub use template::TemplateEngine;
