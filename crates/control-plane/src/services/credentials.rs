//! Copy cloud account credentials into a task config.

use kubefleet_steps::{CloudProvider, Config};

use crate::error::{AppError, AppResult};
use crate::model::CloudAccount;

/// Credential keys each provider's steps rely on.
pub fn required_credentials(provider: CloudProvider) -> &'static [&'static str] {
    match provider {
        CloudProvider::DigitalOcean => &["accessToken"],
        CloudProvider::Aws => &["access_key", "secret_key"],
        CloudProvider::Gce => &["service_account_json"],
        CloudProvider::OpenStack => &["username", "password", "auth_url"],
        CloudProvider::Packet => &["api_key", "project_id"],
    }
}

/// Check that `account` carries every key its provider needs.
pub fn check_credentials(account: &CloudAccount) -> AppResult<()> {
    let missing: Vec<&str> = required_credentials(account.provider)
        .iter()
        .copied()
        .filter(|key| {
            account
                .credentials
                .get(*key)
                .map_or(true, |v| v.trim().is_empty())
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "cloud account {} ({}) is missing credentials: {}",
            account.name,
            account.provider,
            missing.join(", ")
        )))
    }
}

/// Fill the provider and the provider's credentials of `account` into `config`.
pub fn fill_cloud_account_credentials(account: &CloudAccount, config: &mut Config) -> AppResult<()> {
    check_credentials(account)?;

    config.provider = Some(account.provider);
    config.profile.provider = Some(account.provider);
    config.cloud_account_name = account.name.clone();
    for key in required_credentials(account.provider) {
        if let Some(value) = account.credentials.get(*key) {
            config.credentials.insert(key.to_string(), value.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn account(provider: CloudProvider, creds: &[(&str, &str)]) -> CloudAccount {
        CloudAccount {
            name: "main".to_string(),
            provider,
            credentials: creds
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_fill_digitalocean() {
        let acc = account(
            CloudProvider::DigitalOcean,
            &[("accessToken", "tok"), ("unrelated", "x")],
        );
        let mut config = Config::default();
        fill_cloud_account_credentials(&acc, &mut config).unwrap();

        assert_eq!(config.provider, Some(CloudProvider::DigitalOcean));
        assert_eq!(config.credential("accessToken"), Some("tok"));
        assert_eq!(config.credential("unrelated"), None);
        assert_eq!(config.cloud_account_name, "main");
    }

    #[test]
    fn test_missing_keys_are_validation_errors() {
        let acc = account(CloudProvider::Aws, &[("access_key", "a")]);
        let mut config = Config::default();
        match fill_cloud_account_credentials(&acc, &mut config) {
            Err(AppError::Validation(msg)) => assert!(msg.contains("secret_key")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(config.credentials.is_empty());
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let acc = account(CloudProvider::Gce, &[("service_account_json", "  ")]);
        assert!(check_credentials(&acc).is_err());
    }

    #[test]
    fn test_every_provider_has_requirements() {
        for provider in [
            CloudProvider::DigitalOcean,
            CloudProvider::Aws,
            CloudProvider::Gce,
            CloudProvider::OpenStack,
            CloudProvider::Packet,
        ] {
            assert!(!required_credentials(provider).is_empty());
        }
    }
}
