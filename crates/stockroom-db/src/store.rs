//! Store traits consumed by the catalog, cart, and HTTP layers, plus the
//! Postgres implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use stockroom_core::{RawItem, TriggerSource};
use uuid::Uuid;

use crate::carts::{self, CartItemRow, CartOwner, CartRow, MergeWrite, NewCart};
use crate::catalog::{
    self, CatalogMetadata, CleanFields, NewParent, ParentFilter, ParentRow, RawProductRow,
    RawUpsert, UpsertedVariant, VariantRow, VariantUpsert,
};
use crate::job_runs::{self, JobRunRow, JobType};
use crate::DbError;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn ping(&self) -> Result<(), DbError>;

    async fn upsert_raw_item(&self, item: &RawItem) -> Result<RawUpsert, DbError>;
    async fn list_unnormalized(
        &self,
        limit: i64,
        require_stock: bool,
    ) -> Result<Vec<RawProductRow>, DbError>;
    async fn mark_normalized(&self, id: Uuid, clean: &CleanFields) -> Result<(), DbError>;
    async fn get_raw_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<RawProductRow>, DbError>;
    async fn set_raw_stock(&self, external_id: &str, stock_count: i32) -> Result<bool, DbError>;

    async fn find_parent(&self, brand: &str, model: &str) -> Result<Option<ParentRow>, DbError>;
    async fn create_parent(&self, parent: &NewParent) -> Result<ParentRow, DbError>;
    async fn get_parent(&self, id: Uuid) -> Result<Option<ParentRow>, DbError>;
    async fn list_parent_ids(&self) -> Result<Vec<Uuid>, DbError>;
    async fn recompute_parent_stock(&self, parent_id: Uuid) -> Result<Option<i32>, DbError>;
    async fn list_parents(&self, filter: &ParentFilter) -> Result<Vec<ParentRow>, DbError>;
    /// Parents matching `filter`, ignoring its limit and offset.
    async fn count_parents(&self, filter: &ParentFilter) -> Result<i64, DbError>;
    async fn catalog_metadata(&self) -> Result<CatalogMetadata, DbError>;

    async fn upsert_variant(&self, variant: &VariantUpsert) -> Result<UpsertedVariant, DbError>;
    async fn get_variant_by_external_id(
        &self,
        external_item_id: &str,
    ) -> Result<Option<VariantRow>, DbError>;
    async fn update_variant_inventory(
        &self,
        external_item_id: &str,
        stock_count: i32,
        price: Option<i64>,
    ) -> Result<Option<Uuid>, DbError>;
    async fn list_variants(&self, parent_id: Uuid) -> Result<Vec<VariantRow>, DbError>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn latest_user_cart(&self, user_id: &str) -> Result<Option<CartRow>, DbError>;
    async fn latest_session_cart(&self, session_id: &str) -> Result<Option<CartRow>, DbError>;
    async fn get_cart(&self, id: Uuid) -> Result<Option<CartRow>, DbError>;
    async fn list_owner_carts(&self, owner: &CartOwner) -> Result<Vec<CartRow>, DbError>;
    async fn insert_cart(&self, cart: &NewCart) -> Result<CartRow, DbError>;
    async fn rehome_cart(
        &self,
        cart_id: Uuid,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CartRow, DbError>;
    async fn delete_cart(&self, cart_id: Uuid) -> Result<bool, DbError>;
    async fn touch_cart(&self, cart_id: Uuid, now: DateTime<Utc>) -> Result<(), DbError>;

    async fn list_cart_items(&self, cart_id: Uuid) -> Result<Vec<CartItemRow>, DbError>;
    async fn insert_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartItemRow>, DbError>;
    async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartItemRow>, DbError>;
    async fn delete_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<bool, DbError>;
    async fn clear_items(&self, cart_id: Uuid) -> Result<u64, DbError>;
    async fn apply_merge(
        &self,
        user_cart_id: Uuid,
        session_cart_id: Uuid,
        writes: &[MergeWrite],
        now: DateTime<Utc>,
    ) -> Result<(), DbError>;
}

#[async_trait]
pub trait JobRunStore: Send + Sync {
    async fn create_job_run(
        &self,
        job_type: JobType,
        trigger: TriggerSource,
    ) -> Result<JobRunRow, DbError>;
    async fn complete_job_run(&self, id: Uuid, records_processed: i32) -> Result<(), DbError>;
    async fn fail_job_run(&self, id: Uuid, error_message: &str) -> Result<(), DbError>;
    async fn list_job_runs(&self, limit: i64) -> Result<Vec<JobRunRow>, DbError>;
}

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn ping(&self) -> Result<(), DbError> {
        crate::ping(&self.pool).await?;
        Ok(())
    }

    async fn upsert_raw_item(&self, item: &RawItem) -> Result<RawUpsert, DbError> {
        catalog::upsert_raw_item(&self.pool, item).await
    }

    async fn list_unnormalized(
        &self,
        limit: i64,
        require_stock: bool,
    ) -> Result<Vec<RawProductRow>, DbError> {
        catalog::list_unnormalized(&self.pool, limit, require_stock).await
    }

    async fn mark_normalized(&self, id: Uuid, clean: &CleanFields) -> Result<(), DbError> {
        catalog::mark_normalized(&self.pool, id, clean).await
    }

    async fn get_raw_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<RawProductRow>, DbError> {
        catalog::get_raw_by_external_id(&self.pool, external_id).await
    }

    async fn set_raw_stock(&self, external_id: &str, stock_count: i32) -> Result<bool, DbError> {
        catalog::set_raw_stock(&self.pool, external_id, stock_count).await
    }

    async fn find_parent(&self, brand: &str, model: &str) -> Result<Option<ParentRow>, DbError> {
        catalog::find_parent(&self.pool, brand, model).await
    }

    async fn create_parent(&self, parent: &NewParent) -> Result<ParentRow, DbError> {
        catalog::create_parent(&self.pool, parent).await
    }

    async fn get_parent(&self, id: Uuid) -> Result<Option<ParentRow>, DbError> {
        catalog::get_parent(&self.pool, id).await
    }

    async fn list_parent_ids(&self) -> Result<Vec<Uuid>, DbError> {
        catalog::list_parent_ids(&self.pool).await
    }

    async fn recompute_parent_stock(&self, parent_id: Uuid) -> Result<Option<i32>, DbError> {
        catalog::recompute_parent_stock(&self.pool, parent_id).await
    }

    async fn list_parents(&self, filter: &ParentFilter) -> Result<Vec<ParentRow>, DbError> {
        catalog::list_parents(&self.pool, filter).await
    }

    async fn count_parents(&self, filter: &ParentFilter) -> Result<i64, DbError> {
        catalog::count_parents(&self.pool, filter).await
    }

    async fn catalog_metadata(&self) -> Result<CatalogMetadata, DbError> {
        catalog::catalog_metadata(&self.pool).await
    }

    async fn upsert_variant(&self, variant: &VariantUpsert) -> Result<UpsertedVariant, DbError> {
        catalog::upsert_variant(&self.pool, variant).await
    }

    async fn get_variant_by_external_id(
        &self,
        external_item_id: &str,
    ) -> Result<Option<VariantRow>, DbError> {
        catalog::get_variant_by_external_id(&self.pool, external_item_id).await
    }

    async fn update_variant_inventory(
        &self,
        external_item_id: &str,
        stock_count: i32,
        price: Option<i64>,
    ) -> Result<Option<Uuid>, DbError> {
        catalog::update_variant_inventory(&self.pool, external_item_id, stock_count, price).await
    }

    async fn list_variants(&self, parent_id: Uuid) -> Result<Vec<VariantRow>, DbError> {
        catalog::list_variants(&self.pool, parent_id).await
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn latest_user_cart(&self, user_id: &str) -> Result<Option<CartRow>, DbError> {
        carts::latest_user_cart(&self.pool, user_id).await
    }

    async fn latest_session_cart(&self, session_id: &str) -> Result<Option<CartRow>, DbError> {
        carts::latest_session_cart(&self.pool, session_id).await
    }

    async fn get_cart(&self, id: Uuid) -> Result<Option<CartRow>, DbError> {
        carts::get_cart(&self.pool, id).await
    }

    async fn list_owner_carts(&self, owner: &CartOwner) -> Result<Vec<CartRow>, DbError> {
        carts::list_owner_carts(&self.pool, owner).await
    }

    async fn insert_cart(&self, cart: &NewCart) -> Result<CartRow, DbError> {
        carts::insert_cart(&self.pool, cart).await
    }

    async fn rehome_cart(
        &self,
        cart_id: Uuid,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CartRow, DbError> {
        carts::rehome_cart(&self.pool, cart_id, user_id, now).await
    }

    async fn delete_cart(&self, cart_id: Uuid) -> Result<bool, DbError> {
        carts::delete_cart(&self.pool, cart_id).await
    }

    async fn touch_cart(&self, cart_id: Uuid, now: DateTime<Utc>) -> Result<(), DbError> {
        carts::touch_cart(&self.pool, cart_id, now).await
    }

    async fn list_cart_items(&self, cart_id: Uuid) -> Result<Vec<CartItemRow>, DbError> {
        carts::list_cart_items(&self.pool, cart_id).await
    }

    async fn insert_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartItemRow>, DbError> {
        carts::insert_item(&self.pool, cart_id, product_id, quantity, now).await
    }

    async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartItemRow>, DbError> {
        carts::update_item_quantity(&self.pool, cart_id, item_id, quantity, now).await
    }

    async fn delete_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<bool, DbError> {
        carts::delete_item(&self.pool, cart_id, item_id).await
    }

    async fn clear_items(&self, cart_id: Uuid) -> Result<u64, DbError> {
        carts::clear_items(&self.pool, cart_id).await
    }

    async fn apply_merge(
        &self,
        user_cart_id: Uuid,
        session_cart_id: Uuid,
        writes: &[MergeWrite],
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        carts::apply_merge(&self.pool, user_cart_id, session_cart_id, writes, now).await
    }
}

#[async_trait]
impl JobRunStore for PgStore {
    async fn create_job_run(
        &self,
        job_type: JobType,
        trigger: TriggerSource,
    ) -> Result<JobRunRow, DbError> {
        job_runs::create_job_run(&self.pool, job_type, trigger).await
    }

    async fn complete_job_run(&self, id: Uuid, records_processed: i32) -> Result<(), DbError> {
        job_runs::complete_job_run(&self.pool, id, records_processed).await
    }

    async fn fail_job_run(&self, id: Uuid, error_message: &str) -> Result<(), DbError> {
        job_runs::fail_job_run(&self.pool, id, error_message).await
    }

    async fn list_job_runs(&self, limit: i64) -> Result<Vec<JobRunRow>, DbError> {
        job_runs::list_job_runs(&self.pool, limit).await
    }
}
