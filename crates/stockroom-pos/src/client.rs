//! HTTP client for the point-of-sale inventory listing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use stockroom_core::{AppConfig, RawItem};

use crate::error::PosError;
use crate::parse::parse_items_page;
use crate::rate_limit::retry_with_backoff;

/// One page of upstream inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryPage {
    pub items: Vec<RawItem>,
    /// Elements the upstream returned, including ones skipped as malformed.
    pub raw_count: usize,
}

/// Offset-paged source of inventory items.
///
/// Implemented by [`PosClient`]; tests substitute canned pages.
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn fetch_page(&self, offset: u32, limit: u32) -> Result<InventoryPage, PosError>;
}

#[derive(Clone)]
pub struct PosClientConfig {
    pub base_url: String,
    pub access_token: String,
    pub merchant_id: String,
    pub timeout_secs: u64,
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl std::fmt::Debug for PosClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PosClientConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"[redacted]")
            .field("merchant_id", &self.merchant_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .finish()
    }
}

impl PosClientConfig {
    /// Builds client settings from app config.
    ///
    /// Returns `Err(var_name)` naming the first missing credential.
    ///
    /// # Errors
    ///
    /// Returns the env var name of a missing access token or merchant id.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, &'static str> {
        let access_token = config
            .pos_access_token
            .clone()
            .ok_or("STOCKROOM_POS_ACCESS_TOKEN")?;
        let merchant_id = config
            .pos_merchant_id
            .clone()
            .ok_or("STOCKROOM_POS_MERCHANT_ID")?;
        Ok(Self {
            base_url: config.pos_base_url.clone(),
            access_token,
            merchant_id,
            timeout_secs: config.pos_request_timeout_secs,
            max_retries: config.pos_max_retries,
            backoff_base_ms: config.pos_retry_backoff_base_ms,
        })
    }
}

/// Bearer-authenticated client for `/v3/merchants/{merchant}/items`.
///
/// 429, 502, 503 and network failures are retried with jittered exponential
/// backoff; a page that exhausts its retries is returned as an error.
pub struct PosClient {
    client: Client,
    config: PosClientConfig,
}

impl PosClient {
    /// # Errors
    ///
    /// Returns [`PosError::Http`] if the underlying `reqwest::Client` cannot
    /// be constructed.
    pub fn new(config: PosClientConfig) -> Result<Self, PosError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("stockroom/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn items_url(&self, offset: u32, limit: u32) -> Result<String, PosError> {
        let base = format!(
            "{}/v3/merchants/{}/items",
            self.config.base_url.trim_end_matches('/'),
            self.config.merchant_id
        );
        let mut url = reqwest::Url::parse(&base).map_err(|e| PosError::InvalidBaseUrl {
            base_url: self.config.base_url.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("expand", "itemStock");
        Ok(url.to_string())
    }

    /// Fetches one page, retrying transient failures.
    ///
    /// # Errors
    ///
    /// - [`PosError::RateLimited`] / [`PosError::Unavailable`] after retries run out.
    /// - [`PosError::Unauthorized`] on 401/403 (not retried).
    /// - [`PosError::UnexpectedStatus`] for any other non-2xx status.
    /// - [`PosError::Deserialize`] if the body is not JSON.
    pub async fn fetch_items_page(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<InventoryPage, PosError> {
        let url = self.items_url(offset, limit)?;

        retry_with_backoff(self.config.max_retries, self.config.backoff_base_ms, || {
            let url = url.clone();
            async move {
                let response = self
                    .client
                    .get(&url)
                    .bearer_auth(&self.config.access_token)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .send()
                    .await?;
                let status = response.status();
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse::<u64>().ok());

                match status.as_u16() {
                    429 => return Err(PosError::RateLimited { retry_after_secs }),
                    502 | 503 => {
                        return Err(PosError::Unavailable {
                            status: status.as_u16(),
                            retry_after_secs,
                        })
                    }
                    401 | 403 => {
                        return Err(PosError::Unauthorized {
                            status: status.as_u16(),
                        })
                    }
                    _ if !status.is_success() => {
                        return Err(PosError::UnexpectedStatus {
                            status: status.as_u16(),
                            url,
                        })
                    }
                    _ => {}
                }

                let body = response.text().await?;
                let value: serde_json::Value =
                    serde_json::from_str(&body).map_err(|e| PosError::Deserialize {
                        context: format!("inventory page at offset {offset}"),
                        source: e,
                    })?;
                let parsed = parse_items_page(&value);
                Ok(InventoryPage {
                    items: parsed.items,
                    raw_count: parsed.raw_count,
                })
            }
        })
        .await
    }
}

#[async_trait]
impl InventorySource for PosClient {
    async fn fetch_page(&self, offset: u32, limit: u32) -> Result<InventoryPage, PosError> {
        self.fetch_items_page(offset, limit).await
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
