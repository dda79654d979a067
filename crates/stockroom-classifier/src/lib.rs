//! Name classifier adapter: turns a messy product name into a validated
//! [`Classification`](stockroom_core::Classification) via a text-completion
//! provider, with fallback on rate limit and a TTL cache.

pub mod cache;
pub mod error;
pub mod extract;
pub mod provider;
pub mod service;
pub mod validate;

mod prompt;
mod retry;

pub use cache::{cache_key, ClassificationCache};
pub use error::{ClassifierError, RateLimited};
pub use extract::extract_first_json_object;
pub use provider::{CompletionProvider, MessagesProvider};
pub use service::{ClassifierService, NameClassifier};
pub use validate::validate_classification;
