use crate::app_config::{AppConfig, ClassifierProviderConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a
/// `HashMap` lookup.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    // Empty strings count as unset for optional secrets.
    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got {other:?}"))),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("STOCKROOM_ENV", "development"))?;

    let bind_addr = or_default("STOCKROOM_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("STOCKROOM_BIND_ADDR", e))?;
    let log_level = or_default("STOCKROOM_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("STOCKROOM_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("STOCKROOM_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("STOCKROOM_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let api_keys = parse_list(&or_default("STOCKROOM_API_KEYS", ""));
    let trusted_proxy_secret = optional("STOCKROOM_TRUSTED_PROXY_SECRET");
    let cors_allowed_origins = parse_list(&or_default("STOCKROOM_CORS_ALLOWED_ORIGINS", ""));
    if let Some(bad) = cors_allowed_origins
        .iter()
        .find(|o| !(o.starts_with("http://") || o.starts_with("https://")) || o.ends_with('/'))
    {
        return Err(invalid(
            "STOCKROOM_CORS_ALLOWED_ORIGINS",
            format!("expected scheme://host[:port] without a trailing slash, got {bad:?}"),
        ));
    }

    let pos_base_url = or_default("STOCKROOM_POS_BASE_URL", "https://api.clover.com");
    let pos_access_token = optional("STOCKROOM_POS_ACCESS_TOKEN");
    let pos_merchant_id = optional("STOCKROOM_POS_MERCHANT_ID");
    let pos_page_size = parse_u32("STOCKROOM_POS_PAGE_SIZE", "100")?;
    if pos_page_size == 0 {
        return Err(invalid("STOCKROOM_POS_PAGE_SIZE", "must be at least 1"));
    }
    let pos_max_pages = parse_u32("STOCKROOM_POS_MAX_PAGES", "50")?;
    let pos_inter_page_delay_ms = parse_u64("STOCKROOM_POS_INTER_PAGE_DELAY_MS", "250")?;
    let pos_request_timeout_secs = parse_u64("STOCKROOM_POS_REQUEST_TIMEOUT_SECS", "30")?;
    let pos_max_retries = parse_u32("STOCKROOM_POS_MAX_RETRIES", "3")?;
    let pos_retry_backoff_base_ms = parse_u64("STOCKROOM_POS_RETRY_BACKOFF_BASE_MS", "1000")?;

    let classifier_base_url = or_default(
        "STOCKROOM_CLASSIFIER_BASE_URL",
        "https://api.anthropic.com",
    );
    let classifier_api_key = optional("STOCKROOM_CLASSIFIER_API_KEY");
    let classifier_model = or_default("STOCKROOM_CLASSIFIER_MODEL", "claude-3-5-haiku-latest");
    let classifier_fallback = match (
        optional("STOCKROOM_CLASSIFIER_FALLBACK_BASE_URL"),
        optional("STOCKROOM_CLASSIFIER_FALLBACK_API_KEY"),
    ) {
        (Some(base_url), Some(api_key)) => Some(ClassifierProviderConfig {
            base_url,
            api_key,
            model: or_default("STOCKROOM_CLASSIFIER_FALLBACK_MODEL", &classifier_model),
        }),
        (None, None) => None,
        (Some(_), None) => {
            return Err(ConfigError::MissingEnvVar(
                "STOCKROOM_CLASSIFIER_FALLBACK_API_KEY".to_string(),
            ))
        }
        (None, Some(_)) => {
            return Err(ConfigError::MissingEnvVar(
                "STOCKROOM_CLASSIFIER_FALLBACK_BASE_URL".to_string(),
            ))
        }
    };
    let classifier_max_retries = parse_u32("STOCKROOM_CLASSIFIER_MAX_RETRIES", "2")?;
    let classifier_request_timeout_secs =
        parse_u64("STOCKROOM_CLASSIFIER_REQUEST_TIMEOUT_SECS", "30")?;
    let classifier_cache_ttl_days = parse_u64("STOCKROOM_CLASSIFIER_CACHE_TTL_DAYS", "28")?;

    let normalize_batch_limit = parse_u32("STOCKROOM_NORMALIZE_BATCH_LIMIT", "20")?;
    let normalize_row_delay_ms = parse_u64("STOCKROOM_NORMALIZE_ROW_DELAY_MS", "2500")?;
    let normalize_require_stock = parse_bool("STOCKROOM_NORMALIZE_REQUIRE_STOCK", "true")?;

    let sync_cron = or_default("STOCKROOM_SYNC_CRON", "0 */15 * * * *");
    let job_timeout_secs = parse_u64("STOCKROOM_JOB_TIMEOUT_SECS", "300")?;

    let cart_max_item_quantity = or_default("STOCKROOM_CART_MAX_ITEM_QUANTITY", "10")
        .parse::<i32>()
        .map_err(|e| invalid("STOCKROOM_CART_MAX_ITEM_QUANTITY", e))?;
    if cart_max_item_quantity < 1 {
        return Err(invalid(
            "STOCKROOM_CART_MAX_ITEM_QUANTITY",
            "must be at least 1",
        ));
    }
    let cart_max_items = parse_usize("STOCKROOM_CART_MAX_ITEMS", "50")?;
    let cart_max_carts_per_owner = parse_usize("STOCKROOM_CART_MAX_CARTS_PER_OWNER", "5")?;
    if cart_max_carts_per_owner == 0 {
        return Err(invalid(
            "STOCKROOM_CART_MAX_CARTS_PER_OWNER",
            "must be at least 1",
        ));
    }

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        api_keys,
        trusted_proxy_secret,
        cors_allowed_origins,
        pos_base_url,
        pos_access_token,
        pos_merchant_id,
        pos_page_size,
        pos_max_pages,
        pos_inter_page_delay_ms,
        pos_request_timeout_secs,
        pos_max_retries,
        pos_retry_backoff_base_ms,
        classifier_base_url,
        classifier_api_key,
        classifier_model,
        classifier_fallback,
        classifier_max_retries,
        classifier_request_timeout_secs,
        classifier_cache_ttl_days,
        normalize_batch_limit,
        normalize_row_delay_ms,
        normalize_require_stock,
        sync_cron,
        job_timeout_secs,
        cart_max_item_quantity,
        cart_max_items,
        cart_max_carts_per_owner,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(invalid(
            "STOCKROOM_ENV",
            format!("expected development, test, or production; got {other:?}"),
        )),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
