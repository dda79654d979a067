pub mod client;
pub mod error;
pub mod parse;
pub mod webhook;

mod rate_limit;

pub use client::{InventoryPage, InventorySource, PosClient, PosClientConfig};
pub use error::PosError;
pub use parse::{parse_items_page, ParsedPage};
pub use webhook::{parse_webhook, WebhookEvent, WebhookEventType};
