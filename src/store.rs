use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::StoreSettings;
use crate::error::{AppError, AppResult};
use crate::models::SupportedToken;

pub const PRICES_KEY: &str = "prices";
pub const TX_KEY: &str = "tx";
pub const TOKENS_CONFIG_KEY: &str = "tokens-config";

/// Key-value store holding the latest run results
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set(&self, key: &str, value: String) -> AppResult<()>;

    async fn hset(&self, key: &str, fields: BTreeMap<String, String>) -> AppResult<()>;

    async fn flush(&self) -> AppResult<()>;
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    error: Option<String>,
}

/// Redis-protocol store behind a REST endpoint (one JSON command array per request)
pub struct RestKvStore {
    url: String,
    token: String,
    client: reqwest::Client,
}

impl RestKvStore {
    pub fn new(settings: &StoreSettings) -> Self {
        Self {
            url: settings.url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            client: reqwest::Client::new(),
        }
    }

    async fn command(&self, command: Vec<String>) -> AppResult<()> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&command)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Store(format!("{} failed: {}", command[0], error_text)));
        }
        let body: CommandResponse = response.json().await?;
        match body.error {
            Some(error) => Err(AppError::Store(format!("{} failed: {}", command[0], error))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KvStore for RestKvStore {
    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        self.command(vec!["SET".to_string(), key.to_string(), value]).await
    }

    async fn hset(&self, key: &str, fields: BTreeMap<String, String>) -> AppResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut command = vec!["HSET".to_string(), key.to_string()];
        for (field, value) in fields {
            command.push(field);
            command.push(value);
        }
        self.command(command).await
    }

    async fn flush(&self) -> AppResult<()> {
        self.command(vec!["FLUSHDB".to_string()]).await
    }
}

/// Publishes run results; a missing backend turns every call into a no-op.
/// Store failures are logged and never fail the run.
#[derive(Clone, Default)]
pub struct ResultStore {
    backend: Option<Arc<dyn KvStore>>,
}

impl ResultStore {
    pub fn new(backend: Arc<dyn KvStore>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn from_settings(settings: Option<&StoreSettings>) -> Self {
        match settings {
            Some(settings) => Self::new(Arc::new(RestKvStore::new(settings))),
            None => {
                info!("No result store configured");
                Self::default()
            }
        }
    }

    fn report(result: AppResult<()>, what: &str) {
        if let Err(e) = result {
            warn!("⚠️  Failed to {} in the store: {}", what, e);
        }
    }

    pub async fn save_prices(&self, prices: &BTreeMap<String, Decimal>) {
        if let Some(backend) = &self.backend {
            let fields = prices
                .iter()
                .map(|(token_id, price)| (token_id.clone(), price.to_string()))
                .collect();
            Self::report(backend.hset(PRICES_KEY, fields).await, "save prices");
        }
    }

    pub async fn save_tx(&self, tx: &str) {
        if let Some(backend) = &self.backend {
            Self::report(backend.set(TX_KEY, tx.to_string()).await, "save transaction");
        }
    }

    pub async fn save_tokens_config(&self, tokens: &[SupportedToken]) {
        if let Some(backend) = &self.backend {
            match serde_json::to_string(tokens) {
                Ok(json) => Self::report(backend.set(TOKENS_CONFIG_KEY, json).await, "save tokens config"),
                Err(e) => warn!("⚠️  Failed to serialize tokens config: {}", e),
            }
        }
    }

    pub async fn flush(&self) {
        if let Some(backend) = &self.backend {
            Self::report(backend.flush().await, "flush results");
        }
    }
}
