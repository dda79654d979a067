//! Normalization pipeline: classifies raw rows and reconciles them into the
//! parent/variant hierarchy.
//!
//! Rows are processed strictly one at a time. The parent lookup runs per row
//! so that two rows resolving to the same `(brand, model)` in one batch share
//! a single parent.

use std::time::Duration;

use serde::Serialize;
use stockroom_classifier::NameClassifier;
use stockroom_core::{AppConfig, Classification, ProductType};
use stockroom_db::{CatalogStore, CleanFields, NewParent, ParentRow, RawProductRow, VariantUpsert};

use crate::error::CatalogError;
use crate::stock::recompute_parent_stock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub limit: u32,
    /// Skip unnormalized rows with no stock.
    pub require_stock: bool,
    /// Throttle between rows, applied whatever the outcome.
    pub row_delay: Duration,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            require_stock: false,
            row_delay: Duration::from_millis(2_500),
        }
    }
}

impl NormalizeOptions {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            limit: config.normalize_batch_limit,
            require_stock: config.normalize_require_stock,
            row_delay: Duration::from_millis(config.normalize_row_delay_ms),
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeSummary {
    /// Rows fetched for this batch.
    pub total: usize,
    pub normalized: usize,
    /// Rows parked as unclassifiable.
    pub fallen_back: usize,
    pub parents_created: usize,
    pub errors: Vec<String>,
    /// The batch stopped early on a classifier rate limit.
    pub rate_limited: bool,
}

impl NormalizeSummary {
    #[must_use]
    pub fn processed(&self) -> usize {
        self.normalized + self.fallen_back
    }
}

async fn find_or_create_parent(
    store: &dyn CatalogStore,
    row: &RawProductRow,
    c: &Classification,
) -> Result<(ParentRow, bool), CatalogError> {
    if let Some(parent) = store.find_parent(&c.brand, &c.model).await? {
        return Ok((parent, false));
    }
    let parent = store
        .create_parent(&NewParent {
            brand: c.brand.clone(),
            model: c.model.clone(),
            product_type: c.product_type,
            display_price: row.price,
        })
        .await?;
    tracing::info!(parent_id = %parent.id, brand = %c.brand, model = %c.model, "parent created");
    Ok((parent, true))
}

/// Attaches a classified row to its parent. Returns whether a parent was created.
async fn reconcile(
    store: &dyn CatalogStore,
    row: &RawProductRow,
    c: &Classification,
) -> Result<bool, CatalogError> {
    let (parent, created) = find_or_create_parent(store, row, c).await?;

    let upserted = store
        .upsert_variant(&VariantUpsert {
            parent_id: parent.id,
            external_item_id: row.external_id.clone(),
            size: c.size.clone(),
            color: c.colorway.clone(),
            condition: c.condition.map(|cond| cond.as_str().to_string()),
            variant_label: c.variant_label.clone(),
            price: row.price,
            stock_count: row.stock_count,
        })
        .await?;

    recompute_parent_stock(store, parent.id).await?;
    if let Some(old_parent) = upserted.moved_from() {
        tracing::info!(
            external_id = %row.external_id,
            from = %old_parent,
            to = %parent.id,
            "variant moved to a different parent"
        );
        recompute_parent_stock(store, old_parent).await?;
    }

    store
        .mark_normalized(
            row.id,
            &CleanFields {
                clean_name: c.cleaned_name.clone(),
                clean_brand: Some(c.brand.clone()),
                clean_model: Some(c.model.clone()),
                clean_size: c.size.clone(),
                clean_colorway: c.colorway.clone(),
                product_type: c.product_type,
            },
        )
        .await?;
    Ok(created)
}

/// Marks an unclassifiable row normalized with its raw name so it is not
/// retried on every pass.
async fn park(store: &dyn CatalogStore, row: &RawProductRow) -> Result<(), CatalogError> {
    store
        .mark_normalized(
            row.id,
            &CleanFields {
                clean_name: row.display_name.clone(),
                clean_brand: None,
                clean_model: None,
                clean_size: None,
                clean_colorway: None,
                product_type: ProductType::Other,
            },
        )
        .await?;
    Ok(())
}

/// Classifies up to `options.limit` unnormalized rows.
///
/// Per-row failures land in `errors` and the batch continues. A classifier
/// rate limit stops the batch and leaves the remaining rows for the next run.
///
/// # Errors
///
/// Returns [`CatalogError::Store`] only if the batch itself cannot be loaded.
pub async fn normalize_batch(
    store: &dyn CatalogStore,
    classifier: &dyn NameClassifier,
    options: NormalizeOptions,
) -> Result<NormalizeSummary, CatalogError> {
    let rows = store
        .list_unnormalized(i64::from(options.limit), options.require_stock)
        .await?;
    let mut summary = NormalizeSummary {
        total: rows.len(),
        ..NormalizeSummary::default()
    };

    for (index, row) in rows.iter().enumerate() {
        if index > 0 && !options.row_delay.is_zero() {
            tokio::time::sleep(options.row_delay).await;
        }

        let outcome = match classifier.classify(&row.display_name).await {
            Err(_) => {
                tracing::warn!(
                    remaining = rows.len() - index,
                    "classifier rate limited; stopping batch"
                );
                summary.rate_limited = true;
                break;
            }
            Ok(Some(c)) if c.is_usable() => reconcile(store, row, &c).await.map(|created| {
                summary.normalized += 1;
                if created {
                    summary.parents_created += 1;
                }
            }),
            Ok(_) => park(store, row).await.map(|()| {
                tracing::debug!(external_id = %row.external_id, "row parked as unclassifiable");
                summary.fallen_back += 1;
            }),
        };

        if let Err(err) = outcome {
            tracing::warn!(external_id = %row.external_id, error = %err, "row normalization failed");
            summary.errors.push(format!("{}: {err}", row.external_id));
        }
    }

    tracing::info!(
        total = summary.total,
        normalized = summary.normalized,
        fallen_back = summary.fallen_back,
        parents_created = summary.parents_created,
        errors = summary.errors.len(),
        rate_limited = summary.rate_limited,
        "normalization batch finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{classification, item, ScriptedClassifier};
    use stockroom_core::Confidence;
    use stockroom_db::MemoryStore;

    fn opts(limit: u32) -> NormalizeOptions {
        NormalizeOptions {
            limit,
            require_stock: false,
            row_delay: Duration::ZERO,
        }
    }

    async fn seed(store: &MemoryStore, items: &[(&str, &str, i64, i32)]) {
        for (id, name, price, stock) in items {
            store
                .upsert_raw_item(&item(id, name, Some(*price), *stock))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn same_brand_model_shares_one_parent() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[
                ("A", "NIKE DUNK LOW PANDA SZ 9", 11_000, 2),
                ("B", "nike dunk low panda 10 DS", 12_000, 3),
            ],
        )
        .await;
        let classifier = ScriptedClassifier::default()
            .answer(
                "NIKE DUNK LOW PANDA SZ 9",
                Some(classification("Nike", "Dunk Low", Some("9"), Confidence::High)),
            )
            .answer(
                "nike dunk low panda 10 DS",
                Some(classification("Nike", "Dunk Low", Some("10"), Confidence::Medium)),
            );

        let summary = normalize_batch(&store, &classifier, opts(20)).await.unwrap();
        assert_eq!(summary.normalized, 2);
        assert_eq!(summary.parents_created, 1);

        let parents = store.all_parents().await;
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].display_name, "Nike Dunk Low");
        assert_eq!(parents[0].display_price, Some(11_000));
        assert_eq!(parents[0].aggregate_stock, 5);
        assert_eq!(store.all_variants().await.len(), 2);
    }

    #[tokio::test]
    async fn low_confidence_and_unclassifiable_rows_are_parked() {
        let store = MemoryStore::new();
        seed(&store, &[("A", "misc thing 1", 500, 1), ("B", "???", 500, 1)]).await;
        let classifier = ScriptedClassifier::default().answer(
            "misc thing 1",
            Some(classification("Misc", "Thing", None, Confidence::Low)),
        );

        let summary = normalize_batch(&store, &classifier, opts(20)).await.unwrap();
        assert_eq!(summary.fallen_back, 2);
        assert_eq!(summary.normalized, 0);
        assert!(store.all_parents().await.is_empty());

        for (id, name) in [("A", "misc thing 1"), ("B", "???")] {
            let row = store.get_raw_by_external_id(id).await.unwrap().unwrap();
            assert!(row.is_normalized);
            assert_eq!(row.clean_name.as_deref(), Some(name));
            assert_eq!(row.product_type, "other");
        }
    }

    #[tokio::test]
    async fn rerun_is_a_no_op() {
        let store = MemoryStore::new();
        seed(&store, &[("A", "Adidas Samba OG 9", 9_000, 1)]).await;
        let classifier = ScriptedClassifier::default().answer(
            "Adidas Samba OG 9",
            Some(classification("Adidas", "Samba OG", Some("9"), Confidence::High)),
        );

        normalize_batch(&store, &classifier, opts(20)).await.unwrap();
        let second = normalize_batch(&store, &classifier, opts(20)).await.unwrap();

        assert_eq!(second.total, 0);
        assert_eq!(classifier.calls().len(), 1);
        assert_eq!(store.all_parents().await.len(), 1);
        assert_eq!(store.all_variants().await.len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_stops_batch_and_leaves_rest() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[
                ("A", "Nike Dunk Low 9", 11_000, 1),
                ("B", "Nike Dunk Low 10", 11_000, 1),
                ("C", "Nike Dunk Low 11", 11_000, 1),
            ],
        )
        .await;
        let classifier = ScriptedClassifier::default()
            .answer(
                "Nike Dunk Low 9",
                Some(classification("Nike", "Dunk Low", Some("9"), Confidence::High)),
            )
            .rate_limit("Nike Dunk Low 10");

        let summary = normalize_batch(&store, &classifier, opts(20)).await.unwrap();
        assert!(summary.rate_limited);
        assert_eq!(summary.normalized, 1);
        assert_eq!(classifier.calls().len(), 2);

        let left = store.list_unnormalized(20, false).await.unwrap();
        let ids: Vec<_> = left.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn limit_and_stock_filter_bound_the_batch() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[("A", "a", 100, 0), ("B", "b", 100, 1), ("C", "c", 100, 1)],
        )
        .await;
        let classifier = ScriptedClassifier::default();
        let options = NormalizeOptions {
            require_stock: true,
            ..opts(1)
        };

        let summary = normalize_batch(&store, &classifier, options).await.unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(classifier.calls(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn reclassified_variant_recomputes_both_parents() {
        let store = MemoryStore::new();
        seed(&store, &[("A", "Jordan 1 Chicago 10", 30_000, 2)]).await;
        let old = store
            .create_parent(&NewParent {
                brand: "Nike".to_string(),
                model: "Air Jordan 1".to_string(),
                product_type: ProductType::Sneaker,
                display_price: Some(30_000),
            })
            .await
            .unwrap();
        store
            .upsert_variant(&VariantUpsert {
                parent_id: old.id,
                external_item_id: "A".to_string(),
                size: Some("10".to_string()),
                color: None,
                condition: None,
                variant_label: None,
                price: Some(30_000),
                stock_count: 2,
            })
            .await
            .unwrap();
        store.recompute_parent_stock(old.id).await.unwrap();

        let classifier = ScriptedClassifier::default().answer(
            "Jordan 1 Chicago 10",
            Some(classification("Jordan", "1 Retro High", Some("10"), Confidence::High)),
        );
        normalize_batch(&store, &classifier, opts(20)).await.unwrap();

        let old = store.get_parent(old.id).await.unwrap().unwrap();
        assert_eq!(old.aggregate_stock, 0);
        let new = store.find_parent("Jordan", "1 Retro High").await.unwrap().unwrap();
        assert_eq!(new.aggregate_stock, 2);
    }
}
