pub mod app_config;
pub mod cart;
pub mod clock;
pub mod config;
pub mod products;

pub use app_config::{AppConfig, ClassifierProviderConfig, Environment};
pub use cart::{CartLimits, Identity};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_app_config, load_app_config_from_env};
pub use products::{
    Classification, Condition, Confidence, ProductType, RawItem, TriggerSource,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
