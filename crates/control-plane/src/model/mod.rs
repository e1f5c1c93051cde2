//! Cluster and cloud account records.

mod account;
mod certs;
mod kube;

pub use account::{AccountSummary, CloudAccount};
pub use certs::CertBundle;
pub use kube::{ClusterState, Kube, Networking};
