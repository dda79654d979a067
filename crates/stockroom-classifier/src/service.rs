//! Classification entry point used by the normalization pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use stockroom_core::{AppConfig, Classification, Clock};

use crate::cache::ClassificationCache;
use crate::error::{ClassifierError, RateLimited};
use crate::extract::extract_first_json_object;
use crate::prompt::{classification_prompt, SYSTEM_PROMPT};
use crate::provider::{CompletionProvider, MessagesProvider};
use crate::retry::retry_with_backoff;
use crate::validate::validate_classification;

/// Raw name in, structured guess out.
///
/// `Ok(None)` means the name could not be classified (transport failure,
/// malformed output, missing required fields). `Err(RateLimited)` means no
/// provider is currently accepting requests.
#[async_trait]
pub trait NameClassifier: Send + Sync {
    async fn classify(&self, raw_name: &str) -> Result<Option<Classification>, RateLimited>;
}

enum Attempt {
    Done(Option<Classification>),
    RateLimited,
}

pub struct ClassifierService {
    primary: Arc<dyn CompletionProvider>,
    fallback: Option<Arc<dyn CompletionProvider>>,
    cache: ClassificationCache,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl std::fmt::Debug for ClassifierService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierService")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|p| p.name()))
            .field("cache", &self.cache)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl ClassifierService {
    #[must_use]
    pub fn new(
        primary: Arc<dyn CompletionProvider>,
        fallback: Option<Arc<dyn CompletionProvider>>,
        cache: ClassificationCache,
    ) -> Self {
        Self {
            primary,
            fallback,
            cache,
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Builds the service from configuration.
    ///
    /// Returns `Ok(None)` when the primary credential is absent; callers that
    /// need classification treat that as a startup error.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::Http`] if an HTTP client cannot be built.
    pub fn from_app_config(
        config: &AppConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Option<Self>, ClassifierError> {
        let Some(primary_config) = config.classifier_primary() else {
            return Ok(None);
        };
        let timeout = config.classifier_request_timeout_secs;
        let primary: Arc<dyn CompletionProvider> =
            Arc::new(MessagesProvider::new("primary", &primary_config, timeout)?);
        let fallback = match &config.classifier_fallback {
            Some(fb) => Some(Arc::new(MessagesProvider::new("fallback", fb, timeout)?)
                as Arc<dyn CompletionProvider>),
            None => None,
        };
        let cache = ClassificationCache::with_ttl_days(config.classifier_cache_ttl_days, clock);
        Ok(Some(
            Self::new(primary, fallback, cache).with_retry_policy(config.classifier_max_retries, 500),
        ))
    }

    async fn attempt(&self, provider: &dyn CompletionProvider, raw_name: &str) -> Attempt {
        let prompt = classification_prompt(raw_name);
        let result = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            provider.complete(SYSTEM_PROMPT, &prompt)
        })
        .await;

        match result {
            Ok(text) => {
                let parsed = extract_first_json_object(&text).and_then(|v| validate_classification(&v));
                if parsed.is_none() {
                    tracing::warn!(provider = provider.name(), raw_name, "unusable classifier output");
                }
                Attempt::Done(parsed)
            }
            Err(err) if err.is_rate_limited() => Attempt::RateLimited,
            Err(err) => {
                tracing::warn!(provider = provider.name(), raw_name, error = %err, "classification failed");
                Attempt::Done(None)
            }
        }
    }
}

#[async_trait]
impl NameClassifier for ClassifierService {
    async fn classify(&self, raw_name: &str) -> Result<Option<Classification>, RateLimited> {
        if let Some(hit) = self.cache.get(raw_name).await {
            tracing::debug!(raw_name, "classification cache hit");
            return Ok(Some(hit));
        }

        let outcome = match self.attempt(self.primary.as_ref(), raw_name).await {
            Attempt::Done(result) => result,
            Attempt::RateLimited => {
                let Some(fallback) = &self.fallback else {
                    tracing::warn!(raw_name, "primary classifier rate limited, no fallback configured");
                    return Err(RateLimited);
                };
                tracing::info!(raw_name, "primary classifier rate limited, trying fallback");
                match self.attempt(fallback.as_ref(), raw_name).await {
                    Attempt::Done(result) => result,
                    Attempt::RateLimited => return Err(RateLimited),
                }
            }
        };

        if let Some(classification) = &outcome {
            self.cache.insert(raw_name, classification.clone()).await;
        }
        Ok(outcome)
    }
}
