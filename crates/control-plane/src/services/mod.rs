//! Service layer for the KubeFleet Control Plane.
//!
//! Services own the cluster and cloud account records and sit between the
//! handlers, the reactions and storage.

pub mod account;
pub mod cluster;
pub mod credentials;

pub use account::{AccountGetter, AccountService, ACCOUNT_PREFIX};
pub use cluster::{ClusterService, CERTS_PREFIX, KUBE_PREFIX};
pub use credentials::{check_credentials, fill_cloud_account_credentials, required_credentials};
