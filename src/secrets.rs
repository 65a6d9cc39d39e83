//! Warehouse credentials, read once per run from a secret store.

use std::fmt;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_secretsmanager::{error::DisplayErrorContext, Client};
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::{PipelineError, Result};

const REQUIRED_KEYS: [&str; 6] = ["user", "password", "account", "warehouse", "database", "schema"];

#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Raw secret string for `name`.
    async fn secret_string(&self, name: &str) -> Result<String>;
}

pub struct AwsSecrets {
    client: Client,
}

impl AwsSecrets {
    pub fn from_config(sdk: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk),
        }
    }
}

#[async_trait]
impl SecretSource for AwsSecrets {
    #[instrument(level = "debug", skip(self))]
    async fn secret_string(&self, name: &str) -> Result<String> {
        let out = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| {
                PipelineError::Connection(format!(
                    "reading secret {}: {}",
                    name,
                    DisplayErrorContext(e)
                ))
            })?;
        out.secret_string()
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Configuration(format!("secret {} has no string value", name)))
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct WarehouseCredentials {
    pub user: String,
    pub password: String,
    pub account: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
}

impl fmt::Debug for WarehouseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("account", &self.account)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

impl WarehouseCredentials {
    /// Parse the secret JSON. Every missing or non-string key is reported at once.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| PipelineError::Configuration(format!("credentials secret is not JSON: {}", e)))?;

        let field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| field(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "credentials secret is missing: {}",
                missing.join(", ")
            )));
        }

        let take = |key: &str| field(key).unwrap_or_default();
        Ok(Self {
            user: take("user"),
            password: take("password"),
            account: take("account"),
            warehouse: take("warehouse"),
            database: take("database"),
            schema: take("schema"),
        })
    }
}

pub async fn fetch_credentials(source: &dyn SecretSource, name: &str) -> Result<WarehouseCredentials> {
    let raw = source.secret_string(name).await?;
    let creds = WarehouseCredentials::from_json(&raw)?;
    info!(secret = name, account = %creds.account, "warehouse credentials loaded");
    Ok(creds)
}
