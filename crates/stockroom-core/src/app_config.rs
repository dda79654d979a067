use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Connection settings for one text-completion provider.
#[derive(Clone)]
pub struct ClassifierProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl std::fmt::Debug for ClassifierProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub api_keys: Vec<String>,
    /// Shared secret the auth proxy sends alongside the user header. Without
    /// it the user header is ignored.
    pub trusted_proxy_secret: Option<String>,
    /// Browser origins allowed to call the API with credentials.
    pub cors_allowed_origins: Vec<String>,

    pub pos_base_url: String,
    pub pos_access_token: Option<String>,
    pub pos_merchant_id: Option<String>,
    pub pos_page_size: u32,
    pub pos_max_pages: u32,
    pub pos_inter_page_delay_ms: u64,
    pub pos_request_timeout_secs: u64,
    pub pos_max_retries: u32,
    pub pos_retry_backoff_base_ms: u64,

    pub classifier_base_url: String,
    pub classifier_api_key: Option<String>,
    pub classifier_model: String,
    /// Second provider, consulted only when the primary is rate limited.
    pub classifier_fallback: Option<ClassifierProviderConfig>,
    pub classifier_max_retries: u32,
    pub classifier_request_timeout_secs: u64,
    pub classifier_cache_ttl_days: u64,

    pub normalize_batch_limit: u32,
    pub normalize_row_delay_ms: u64,
    pub normalize_require_stock: bool,

    pub sync_cron: String,
    pub job_timeout_secs: u64,

    pub cart_max_item_quantity: i32,
    pub cart_max_items: usize,
    pub cart_max_carts_per_owner: usize,
}

impl AppConfig {
    /// Primary classifier provider, if its credential is configured.
    #[must_use]
    pub fn classifier_primary(&self) -> Option<ClassifierProviderConfig> {
        self.classifier_api_key
            .as_ref()
            .map(|api_key| ClassifierProviderConfig {
                base_url: self.classifier_base_url.clone(),
                api_key: api_key.clone(),
                model: self.classifier_model.clone(),
            })
    }

    #[must_use]
    pub fn cart_limits(&self) -> crate::CartLimits {
        crate::CartLimits {
            max_item_quantity: self.cart_max_item_quantity,
            max_cart_items: self.cart_max_items,
            max_carts_per_owner: self.cart_max_carts_per_owner,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("api_keys", &format!("[{} redacted]", self.api_keys.len()))
            .field(
                "trusted_proxy_secret",
                &self.trusted_proxy_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("pos_base_url", &self.pos_base_url)
            .field(
                "pos_access_token",
                &self.pos_access_token.as_ref().map(|_| "[redacted]"),
            )
            .field("pos_merchant_id", &self.pos_merchant_id)
            .field("pos_page_size", &self.pos_page_size)
            .field("pos_max_pages", &self.pos_max_pages)
            .field("pos_inter_page_delay_ms", &self.pos_inter_page_delay_ms)
            .field("pos_request_timeout_secs", &self.pos_request_timeout_secs)
            .field("pos_max_retries", &self.pos_max_retries)
            .field("pos_retry_backoff_base_ms", &self.pos_retry_backoff_base_ms)
            .field("classifier_base_url", &self.classifier_base_url)
            .field(
                "classifier_api_key",
                &self.classifier_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("classifier_model", &self.classifier_model)
            .field("classifier_fallback", &self.classifier_fallback)
            .field("classifier_max_retries", &self.classifier_max_retries)
            .field(
                "classifier_request_timeout_secs",
                &self.classifier_request_timeout_secs,
            )
            .field("classifier_cache_ttl_days", &self.classifier_cache_ttl_days)
            .field("normalize_batch_limit", &self.normalize_batch_limit)
            .field("normalize_row_delay_ms", &self.normalize_row_delay_ms)
            .field("normalize_require_stock", &self.normalize_require_stock)
            .field("sync_cron", &self.sync_cron)
            .field("job_timeout_secs", &self.job_timeout_secs)
            .field("cart_max_item_quantity", &self.cart_max_item_quantity)
            .field("cart_max_items", &self.cart_max_items)
            .field("cart_max_carts_per_owner", &self.cart_max_carts_per_owner)
            .finish()
    }
}
