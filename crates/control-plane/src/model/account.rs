//! Cloud account record.

use kubefleet_steps::CloudProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Credentials for one provider account.
///
/// Stored as-is; API responses use [`AccountSummary`] so credentials are
/// never echoed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudAccount {
    pub name: String,
    pub provider: CloudProvider,
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub name: String,
    pub provider: CloudProvider,
}

impl From<&CloudAccount> for AccountSummary {
    fn from(account: &CloudAccount) -> Self {
        Self {
            name: account.name.clone(),
            provider: account.provider,
        }
    }
}
