//! In-process store with the same uniqueness and ordering rules as the
//! Postgres schema. Backs tests that should not need a database.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stockroom_core::{ProductType, RawItem, TriggerSource};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::carts::{CartItemRow, CartOwner, CartRow, MergeWrite, NewCart};
use crate::catalog::{
    BrandCount, CatalogMetadata, CleanFields, NewParent, ParentFilter, ParentRow, RawProductRow,
    RawUpsert, UpsertedVariant, VariantRow, VariantUpsert,
};
use crate::job_runs::{JobRunRow, JobType};
use crate::store::{CartStore, CatalogStore, JobRunStore};
use crate::DbError;

#[derive(Debug, Default)]
struct State {
    raw: Vec<RawProductRow>,
    parents: Vec<ParentRow>,
    variants: Vec<VariantRow>,
    carts: Vec<CartRow>,
    items: Vec<CartItemRow>,
    runs: Vec<JobRunRow>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `ping` fail, to exercise degraded health paths.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every parent row, in creation order.
    pub async fn all_parents(&self) -> Vec<ParentRow> {
        self.state.lock().await.parents.clone()
    }

    /// Every variant row, in creation order.
    pub async fn all_variants(&self) -> Vec<VariantRow> {
        self.state.lock().await.variants.clone()
    }

    /// Every cart row, in creation order.
    pub async fn all_carts(&self) -> Vec<CartRow> {
        self.state.lock().await.carts.clone()
    }

    /// Overwrites a variant's stock without touching its parent.
    pub async fn force_variant_stock(&self, variant_id: Uuid, stock_count: i32) {
        let mut state = self.state.lock().await;
        if let Some(v) = state.variants.iter_mut().find(|v| v.id == variant_id) {
            v.stock_count = stock_count;
        }
    }
}

fn variant_sum(state: &State, parent_id: Uuid) -> i32 {
    state
        .variants
        .iter()
        .filter(|v| v.parent_id == parent_id)
        .map(|v| v.stock_count)
        .sum()
}

fn matching_parents<'a>(
    parents: &'a [ParentRow],
    filter: &'a ParentFilter,
) -> impl Iterator<Item = &'a ParentRow> + 'a {
    parents
        .iter()
        .filter(|p| {
            filter
                .brand
                .as_ref()
                .is_none_or(|b| p.brand.eq_ignore_ascii_case(b))
        })
        .filter(|p| !filter.in_stock || p.aggregate_stock > 0)
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn ping(&self) -> Result<(), DbError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn upsert_raw_item(&self, item: &RawItem) -> Result<RawUpsert, DbError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(row) = state
            .raw
            .iter_mut()
            .find(|r| r.external_id == item.external_id)
        {
            row.display_name.clone_from(&item.display_name);
            row.price = item.unit_price;
            row.stock_count = item.stock_count.max(0);
            row.updated_at = now;
            return Ok(RawUpsert {
                row: row.clone(),
                inserted: false,
            });
        }

        let row = RawProductRow {
            id: Uuid::new_v4(),
            external_id: item.external_id.clone(),
            display_name: item.display_name.clone(),
            price: item.unit_price,
            stock_count: item.stock_count.max(0),
            is_normalized: false,
            product_type: ProductType::Other.as_str().to_string(),
            clean_name: None,
            clean_brand: None,
            clean_model: None,
            clean_size: None,
            clean_colorway: None,
            created_at: now,
            updated_at: now,
        };
        state.raw.push(row.clone());
        Ok(RawUpsert {
            row,
            inserted: true,
        })
    }

    async fn list_unnormalized(
        &self,
        limit: i64,
        require_stock: bool,
    ) -> Result<Vec<RawProductRow>, DbError> {
        let state = self.state.lock().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(state
            .raw
            .iter()
            .filter(|r| !r.is_normalized && (!require_stock || r.stock_count > 0))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_normalized(&self, id: Uuid, clean: &CleanFields) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let row = state
            .raw
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(DbError::NotFound)?;
        row.is_normalized = true;
        row.clean_name = Some(clean.clean_name.clone());
        row.clean_brand.clone_from(&clean.clean_brand);
        row.clean_model.clone_from(&clean.clean_model);
        row.clean_size.clone_from(&clean.clean_size);
        row.clean_colorway.clone_from(&clean.clean_colorway);
        row.product_type = clean.product_type.as_str().to_string();
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn get_raw_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<RawProductRow>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .raw
            .iter()
            .find(|r| r.external_id == external_id)
            .cloned())
    }

    async fn set_raw_stock(&self, external_id: &str, stock_count: i32) -> Result<bool, DbError> {
        let mut state = self.state.lock().await;
        match state.raw.iter_mut().find(|r| r.external_id == external_id) {
            Some(row) => {
                row.stock_count = stock_count.max(0);
                row.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_parent(&self, brand: &str, model: &str) -> Result<Option<ParentRow>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .parents
            .iter()
            .find(|p| p.brand == brand && p.model == model)
            .cloned())
    }

    async fn create_parent(&self, parent: &NewParent) -> Result<ParentRow, DbError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .parents
            .iter()
            .find(|p| p.brand == parent.brand && p.model == parent.model)
        {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let row = ParentRow {
            id: Uuid::new_v4(),
            brand: parent.brand.clone(),
            model: parent.model.clone(),
            colorway: None,
            display_name: parent.display_name(),
            product_type: parent.product_type.as_str().to_string(),
            display_price: parent.display_price,
            aggregate_stock: 0,
            created_at: now,
            updated_at: now,
        };
        state.parents.push(row.clone());
        Ok(row)
    }

    async fn get_parent(&self, id: Uuid) -> Result<Option<ParentRow>, DbError> {
        let state = self.state.lock().await;
        Ok(state.parents.iter().find(|p| p.id == id).cloned())
    }

    async fn list_parent_ids(&self) -> Result<Vec<Uuid>, DbError> {
        let state = self.state.lock().await;
        Ok(state.parents.iter().map(|p| p.id).collect())
    }

    async fn recompute_parent_stock(&self, parent_id: Uuid) -> Result<Option<i32>, DbError> {
        let mut state = self.state.lock().await;
        let total = variant_sum(&state, parent_id);
        match state.parents.iter_mut().find(|p| p.id == parent_id) {
            Some(parent) => {
                parent.aggregate_stock = total;
                parent.updated_at = Utc::now();
                Ok(Some(total))
            }
            None => Ok(None),
        }
    }

    async fn list_parents(&self, filter: &ParentFilter) -> Result<Vec<ParentRow>, DbError> {
        let state = self.state.lock().await;
        let mut rows: Vec<ParentRow> = matching_parents(&state.parents, filter).cloned().collect();
        rows.sort_by(|a, b| (&a.brand, &a.model, a.id).cmp(&(&b.brand, &b.model, b.id)));
        let offset = usize::try_from(filter.offset.max(0)).unwrap_or(usize::MAX);
        let limit = usize::try_from(filter.limit.max(0)).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_parents(&self, filter: &ParentFilter) -> Result<i64, DbError> {
        let state = self.state.lock().await;
        let count = matching_parents(&state.parents, filter).count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn catalog_metadata(&self) -> Result<CatalogMetadata, DbError> {
        let state = self.state.lock().await;
        let mut brands: Vec<BrandCount> = Vec::new();
        for parent in &state.parents {
            match brands.iter_mut().find(|b| b.brand == parent.brand) {
                Some(entry) => entry.count += 1,
                None => brands.push(BrandCount {
                    brand: parent.brand.clone(),
                    count: 1,
                }),
            }
        }
        brands.sort_by(|a, b| a.brand.cmp(&b.brand));
        let total = state.parents.len();
        let in_stock = state
            .parents
            .iter()
            .filter(|p| p.aggregate_stock > 0)
            .count();
        Ok(CatalogMetadata {
            total_products: i64::try_from(total).unwrap_or(i64::MAX),
            in_stock_products: i64::try_from(in_stock).unwrap_or(i64::MAX),
            brands,
        })
    }

    async fn upsert_variant(&self, variant: &VariantUpsert) -> Result<UpsertedVariant, DbError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(row) = state
            .variants
            .iter_mut()
            .find(|v| v.external_item_id == variant.external_item_id)
        {
            let previous = row.parent_id;
            row.parent_id = variant.parent_id;
            row.size.clone_from(&variant.size);
            row.color.clone_from(&variant.color);
            row.condition.clone_from(&variant.condition);
            row.variant_label.clone_from(&variant.variant_label);
            row.price = variant.price;
            row.stock_count = variant.stock_count.max(0);
            row.updated_at = now;
            return Ok(UpsertedVariant {
                variant: row.clone(),
                previous_parent_id: Some(previous),
            });
        }

        let row = VariantRow {
            id: Uuid::new_v4(),
            parent_id: variant.parent_id,
            external_item_id: variant.external_item_id.clone(),
            size: variant.size.clone(),
            color: variant.color.clone(),
            condition: variant.condition.clone(),
            variant_label: variant.variant_label.clone(),
            price: variant.price,
            stock_count: variant.stock_count.max(0),
            created_at: now,
            updated_at: now,
        };
        state.variants.push(row.clone());
        Ok(UpsertedVariant {
            variant: row,
            previous_parent_id: None,
        })
    }

    async fn get_variant_by_external_id(
        &self,
        external_item_id: &str,
    ) -> Result<Option<VariantRow>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .variants
            .iter()
            .find(|v| v.external_item_id == external_item_id)
            .cloned())
    }

    async fn update_variant_inventory(
        &self,
        external_item_id: &str,
        stock_count: i32,
        price: Option<i64>,
    ) -> Result<Option<Uuid>, DbError> {
        let mut state = self.state.lock().await;
        let Some(row) = state
            .variants
            .iter_mut()
            .find(|v| v.external_item_id == external_item_id)
        else {
            return Ok(None);
        };
        row.stock_count = stock_count.max(0);
        if price.is_some() {
            row.price = price;
        }
        row.updated_at = Utc::now();
        Ok(Some(row.parent_id))
    }

    async fn list_variants(&self, parent_id: Uuid) -> Result<Vec<VariantRow>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .variants
            .iter()
            .filter(|v| v.parent_id == parent_id)
            .cloned()
            .collect())
    }
}

fn latest(carts: impl Iterator<Item = CartRow>) -> Option<CartRow> {
    carts.max_by(|a, b| (a.updated_at, a.id).cmp(&(b.updated_at, b.id)))
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn latest_user_cart(&self, user_id: &str) -> Result<Option<CartRow>, DbError> {
        let state = self.state.lock().await;
        Ok(latest(
            state
                .carts
                .iter()
                .filter(|c| c.user_id.as_deref() == Some(user_id))
                .cloned(),
        ))
    }

    async fn latest_session_cart(&self, session_id: &str) -> Result<Option<CartRow>, DbError> {
        let state = self.state.lock().await;
        Ok(latest(
            state
                .carts
                .iter()
                .filter(|c| c.user_id.is_none() && c.session_id.as_deref() == Some(session_id))
                .cloned(),
        ))
    }

    async fn get_cart(&self, id: Uuid) -> Result<Option<CartRow>, DbError> {
        let state = self.state.lock().await;
        Ok(state.carts.iter().find(|c| c.id == id).cloned())
    }

    async fn list_owner_carts(&self, owner: &CartOwner) -> Result<Vec<CartRow>, DbError> {
        let state = self.state.lock().await;
        let mut rows: Vec<CartRow> = state
            .carts
            .iter()
            .filter(|c| match owner {
                CartOwner::User(id) => c.user_id.as_deref() == Some(id.as_str()),
                CartOwner::Session(id) => {
                    c.user_id.is_none() && c.session_id.as_deref() == Some(id.as_str())
                }
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.updated_at, a.id).cmp(&(b.updated_at, b.id)));
        Ok(rows)
    }

    async fn insert_cart(&self, cart: &NewCart) -> Result<CartRow, DbError> {
        let mut state = self.state.lock().await;
        let (user_id, session_id) = match &cart.owner {
            CartOwner::User(id) => (Some(id.clone()), None),
            CartOwner::Session(id) => (None, Some(id.clone())),
        };
        let row = CartRow {
            id: cart.id,
            user_id,
            session_id,
            created_at: cart.now,
            updated_at: cart.now,
        };
        state.carts.push(row.clone());
        Ok(row)
    }

    async fn rehome_cart(
        &self,
        cart_id: Uuid,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CartRow, DbError> {
        let mut state = self.state.lock().await;
        let cart = state
            .carts
            .iter_mut()
            .find(|c| c.id == cart_id)
            .ok_or(DbError::NotFound)?;
        cart.user_id = Some(user_id.to_string());
        cart.session_id = None;
        cart.updated_at = now;
        Ok(cart.clone())
    }

    async fn delete_cart(&self, cart_id: Uuid) -> Result<bool, DbError> {
        let mut state = self.state.lock().await;
        let before = state.carts.len();
        state.carts.retain(|c| c.id != cart_id);
        state.items.retain(|i| i.cart_id != cart_id);
        Ok(state.carts.len() < before)
    }

    async fn touch_cart(&self, cart_id: Uuid, now: DateTime<Utc>) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        if let Some(cart) = state.carts.iter_mut().find(|c| c.id == cart_id) {
            cart.updated_at = now;
        }
        Ok(())
    }

    async fn list_cart_items(&self, cart_id: Uuid) -> Result<Vec<CartItemRow>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .iter()
            .filter(|i| i.cart_id == cart_id)
            .cloned()
            .collect())
    }

    async fn insert_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartItemRow>, DbError> {
        let mut state = self.state.lock().await;
        if state
            .items
            .iter()
            .any(|i| i.cart_id == cart_id && i.product_id == product_id)
        {
            return Ok(None);
        }
        let row = CartItemRow {
            id: Uuid::new_v4(),
            cart_id,
            product_id,
            quantity,
            created_at: now,
            updated_at: now,
        };
        state.items.push(row.clone());
        Ok(Some(row))
    }

    async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartItemRow>, DbError> {
        let mut state = self.state.lock().await;
        Ok(state
            .items
            .iter_mut()
            .find(|i| i.id == item_id && i.cart_id == cart_id)
            .map(|item| {
                item.quantity = quantity;
                item.updated_at = now;
                item.clone()
            }))
    }

    async fn delete_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<bool, DbError> {
        let mut state = self.state.lock().await;
        let before = state.items.len();
        state
            .items
            .retain(|i| !(i.id == item_id && i.cart_id == cart_id));
        Ok(state.items.len() < before)
    }

    async fn clear_items(&self, cart_id: Uuid) -> Result<u64, DbError> {
        let mut state = self.state.lock().await;
        let before = state.items.len();
        state.items.retain(|i| i.cart_id != cart_id);
        Ok(u64::try_from(before - state.items.len()).unwrap_or(0))
    }

    async fn apply_merge(
        &self,
        user_cart_id: Uuid,
        session_cart_id: Uuid,
        writes: &[MergeWrite],
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        for write in writes {
            match write {
                MergeWrite::SetQuantity { item_id, quantity } => {
                    if let Some(item) = state
                        .items
                        .iter_mut()
                        .find(|i| i.id == *item_id && i.cart_id == user_cart_id)
                    {
                        item.quantity = *quantity;
                        item.updated_at = now;
                    }
                }
                MergeWrite::Insert {
                    product_id,
                    quantity,
                } => state.items.push(CartItemRow {
                    id: Uuid::new_v4(),
                    cart_id: user_cart_id,
                    product_id: *product_id,
                    quantity: *quantity,
                    created_at: now,
                    updated_at: now,
                }),
            }
        }
        state.carts.retain(|c| c.id != session_cart_id);
        state.items.retain(|i| i.cart_id != session_cart_id);
        if let Some(cart) = state.carts.iter_mut().find(|c| c.id == user_cart_id) {
            cart.updated_at = now;
        }
        Ok(())
    }
}

#[async_trait]
impl JobRunStore for MemoryStore {
    async fn create_job_run(
        &self,
        job_type: JobType,
        trigger: TriggerSource,
    ) -> Result<JobRunRow, DbError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let row = JobRunRow {
            id: Uuid::new_v4(),
            job_type: job_type.as_str().to_string(),
            trigger_source: trigger.as_str().to_string(),
            status: "running".to_string(),
            started_at: now,
            completed_at: None,
            records_processed: 0,
            error_message: None,
            created_at: now,
        };
        state.runs.push(row.clone());
        Ok(row)
    }

    async fn complete_job_run(&self, id: Uuid, records_processed: i32) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == id && r.status == "running")
            .ok_or(DbError::InvalidJobRunTransition {
                id,
                expected_status: "running",
            })?;
        run.status = "succeeded".to_string();
        run.completed_at = Some(Utc::now());
        run.records_processed = records_processed;
        Ok(())
    }

    async fn fail_job_run(&self, id: Uuid, error_message: &str) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == id && r.status == "running")
            .ok_or(DbError::InvalidJobRunTransition {
                id,
                expected_status: "running",
            })?;
        run.status = "failed".to_string();
        run.completed_at = Some(Utc::now());
        run.error_message = Some(error_message.to_string());
        Ok(())
    }

    async fn list_job_runs(&self, limit: i64) -> Result<Vec<JobRunRow>, DbError> {
        let state = self.state.lock().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(state.runs.iter().rev().take(limit).cloned().collect())
    }
}
