//! Parent stock aggregation.
//!
//! A parent's `aggregate_stock` is always re-derived from its variants, never
//! patched incrementally. Callers run it after any variant mutation.

use stockroom_db::CatalogStore;
use uuid::Uuid;

use crate::error::CatalogError;

/// Re-derives one parent's stock. Returns the new total, or `None` if the
/// parent does not exist.
///
/// # Errors
///
/// Returns [`CatalogError::Store`] on a store failure.
pub async fn recompute_parent_stock(
    store: &dyn CatalogStore,
    parent_id: Uuid,
) -> Result<Option<i32>, CatalogError> {
    let total = store.recompute_parent_stock(parent_id).await?;
    tracing::debug!(%parent_id, ?total, "parent stock recomputed");
    Ok(total)
}

/// Re-derives every parent's stock. Returns the number of parents visited.
///
/// # Errors
///
/// Returns [`CatalogError::Store`] on the first store failure.
pub async fn recompute_all_parent_stock(store: &dyn CatalogStore) -> Result<usize, CatalogError> {
    let ids = store.list_parent_ids().await?;
    for id in &ids {
        store.recompute_parent_stock(*id).await?;
    }
    tracing::info!(parents = ids.len(), "bulk stock recompute complete");
    Ok(ids.len())
}
