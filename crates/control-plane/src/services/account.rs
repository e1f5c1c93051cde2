//! Cloud account service.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};
use crate::model::CloudAccount;
use crate::storage::Storage;

use super::credentials::check_credentials;

/// Namespace prefix of cloud account records.
pub const ACCOUNT_PREFIX: &str = "/cloudaccounts/";

/// Read access to cloud accounts.
#[async_trait]
pub trait AccountGetter: Send + Sync {
    async fn get(&self, name: &str) -> AppResult<CloudAccount>;
}

#[derive(Clone)]
pub struct AccountService {
    storage: Arc<dyn Storage>,
}

impl AccountService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Store a new account. `Conflict` if the name is taken.
    pub async fn create(&self, account: CloudAccount) -> AppResult<CloudAccount> {
        if account.name.trim().is_empty() {
            return Err(AppError::Validation("account name is required".to_string()));
        }
        check_credentials(&account)?;

        match self.storage.get(ACCOUNT_PREFIX, &account.name).await {
            Ok(_) => {
                return Err(AppError::Conflict(format!(
                    "cloud account {} already exists",
                    account.name
                )))
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let bytes = serde_json::to_vec(&account)?;
        self.storage
            .put(ACCOUNT_PREFIX, &account.name, &bytes)
            .await?;
        tracing::info!(account = %account.name, provider = %account.provider, "Created cloud account");
        Ok(account)
    }

    pub async fn list(&self) -> AppResult<Vec<CloudAccount>> {
        self.storage
            .get_all(ACCOUNT_PREFIX)
            .await?
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).map_err(AppError::from))
            .collect()
    }
}

#[async_trait]
impl AccountGetter for AccountService {
    async fn get(&self, name: &str) -> AppResult<CloudAccount> {
        let bytes = self
            .storage
            .get(ACCOUNT_PREFIX, name)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    AppError::NotFound(format!("cloud account {}", name))
                } else {
                    e
                }
            })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
