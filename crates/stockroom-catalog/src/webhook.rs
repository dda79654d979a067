//! Applies inventory push events to stored stock.
//!
//! `ITEM_DELETE` zeroes stock rather than removing the row. `ITEM_CREATE` is
//! acknowledged and left for the next sync.

use serde::Serialize;
use stockroom_db::CatalogStore;
use stockroom_pos::{WebhookEvent, WebhookEventType};

use crate::error::CatalogError;
use crate::stock::recompute_parent_stock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookSummary {
    pub received: usize,
    /// Events that changed a stored row.
    pub applied: usize,
    /// Create events left for the next sync.
    pub deferred: usize,
    /// Unknown event types, missing stock figures, or unknown items.
    pub ignored: usize,
}

fn clamp_stock(event: &WebhookEvent, raw: i64) -> i32 {
    if raw < 0 {
        tracing::warn!(item_id = %event.item_id, stock = raw, "negative webhook stock clamped to zero");
        return 0;
    }
    i32::try_from(raw).unwrap_or(i32::MAX)
}

/// Writes `stock` to the raw row and, if present, its variant; recomputes
/// the parent. Returns `false` if neither row exists.
async fn apply_stock(
    store: &dyn CatalogStore,
    external_id: &str,
    stock: i32,
) -> Result<bool, CatalogError> {
    let raw_found = store.set_raw_stock(external_id, stock).await?;
    let parent = store.update_variant_inventory(external_id, stock, None).await?;
    if let Some(parent_id) = parent {
        recompute_parent_stock(store, parent_id).await?;
    }
    Ok(raw_found || parent.is_some())
}

/// Applies each event in order.
///
/// # Errors
///
/// Returns [`CatalogError::Store`] on the first store failure; earlier
/// events stay applied.
pub async fn apply_webhook_events(
    store: &dyn CatalogStore,
    events: &[WebhookEvent],
) -> Result<WebhookSummary, CatalogError> {
    let mut summary = WebhookSummary {
        received: events.len(),
        ..WebhookSummary::default()
    };

    for event in events {
        let stock = match &event.event_type {
            WebhookEventType::InventoryUpdate | WebhookEventType::ItemUpdate => {
                match event.stock_count {
                    Some(raw) => clamp_stock(event, raw),
                    None => {
                        summary.ignored += 1;
                        continue;
                    }
                }
            }
            WebhookEventType::ItemDelete => 0,
            WebhookEventType::ItemCreate => {
                tracing::debug!(item_id = %event.item_id, "item create deferred to next sync");
                summary.deferred += 1;
                continue;
            }
            WebhookEventType::Unknown(kind) => {
                tracing::debug!(item_id = %event.item_id, kind = %kind, "unknown webhook event ignored");
                summary.ignored += 1;
                continue;
            }
        };

        if apply_stock(store, &event.item_id, stock).await? {
            summary.applied += 1;
        } else {
            tracing::debug!(item_id = %event.item_id, "webhook for unknown item ignored");
            summary.ignored += 1;
        }
    }

    tracing::info!(
        received = summary.received,
        applied = summary.applied,
        deferred = summary.deferred,
        ignored = summary.ignored,
        "webhook events applied"
    );
    Ok(summary)
}
