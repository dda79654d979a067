//! Mirrors the upstream inventory into raw product rows.

use std::time::Duration;

use serde::Serialize;
use stockroom_core::{AppConfig, RawItem};
use stockroom_db::CatalogStore;
use stockroom_pos::InventorySource;

use crate::error::CatalogError;
use crate::stock::recompute_parent_stock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub page_size: u32,
    /// Safety cap on pages fetched per run.
    pub max_pages: u32,
    pub inter_page_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 50,
            inter_page_delay: Duration::from_millis(250),
        }
    }
}

impl SyncOptions {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            page_size: config.pos_page_size.max(1),
            max_pages: config.pos_max_pages.max(1),
            inter_page_delay: Duration::from_millis(config.pos_inter_page_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Items returned upstream, priced or not.
    pub total: usize,
    pub synced: usize,
    /// Items dropped for lacking a positive price.
    pub skipped: usize,
    pub pages: u32,
    /// The page cap stopped the fetch before upstream ran out.
    pub truncated: bool,
    pub errors: Vec<String>,
}

/// Upserts one item and, if it already has a variant, carries its stock and
/// price through to the variant and recomputes the parent.
async fn sync_item(store: &dyn CatalogStore, item: &RawItem) -> Result<(), CatalogError> {
    let upsert = store.upsert_raw_item(item).await?;
    if upsert.inserted || !upsert.row.is_normalized {
        return Ok(());
    }
    if let Some(parent_id) = store
        .update_variant_inventory(&item.external_id, item.stock_count, item.unit_price)
        .await?
    {
        recompute_parent_stock(store, parent_id).await?;
    }
    Ok(())
}

/// Fetches every upstream page and upserts the priced items.
///
/// New rows start unnormalized; existing rows keep their classification.
/// Per-item store failures are collected in `errors` and the run continues.
///
/// # Errors
///
/// Returns [`CatalogError::Upstream`] if a page exhausts its retries. Pages
/// already processed stay committed.
pub async fn sync_from_source(
    store: &dyn CatalogStore,
    source: &dyn InventorySource,
    options: SyncOptions,
) -> Result<SyncSummary, CatalogError> {
    let mut summary = SyncSummary::default();
    let mut offset: u32 = 0;

    loop {
        if summary.pages >= options.max_pages {
            summary.truncated = true;
            tracing::warn!(
                max_pages = options.max_pages,
                offset,
                "page cap reached; remaining inventory not fetched this run"
            );
            break;
        }
        if summary.pages > 0 && !options.inter_page_delay.is_zero() {
            tokio::time::sleep(options.inter_page_delay).await;
        }

        let page = source
            .fetch_page(offset, options.page_size)
            .await
            .map_err(|source| CatalogError::Upstream { offset, source })?;
        summary.pages += 1;
        summary.total += page.items.len();

        for item in &page.items {
            if !item.has_positive_price() {
                summary.skipped += 1;
                continue;
            }
            match sync_item(store, item).await {
                Ok(()) => summary.synced += 1,
                Err(err) => {
                    tracing::warn!(external_id = %item.external_id, error = %err, "item upsert failed");
                    summary.errors.push(format!("{}: {err}", item.external_id));
                }
            }
        }

        let raw_count = u32::try_from(page.raw_count).unwrap_or(u32::MAX);
        if raw_count < options.page_size {
            break;
        }
        offset = offset.saturating_add(raw_count);
    }

    tracing::info!(
        total = summary.total,
        synced = summary.synced,
        skipped = summary.skipped,
        pages = summary.pages,
        errors = summary.errors.len(),
        "inventory sync finished"
    );
    Ok(summary)
}
