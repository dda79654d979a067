//! Database operations for `products` (parents and raw mirror rows) and `variants`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use stockroom_core::{ProductType, RawItem};
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A raw mirror row: one per upstream inventory item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RawProductRow {
    pub id: Uuid,
    pub external_id: String,
    pub display_name: String,
    /// Minor currency units.
    pub price: Option<i64>,
    pub stock_count: i32,
    pub is_normalized: bool,
    pub product_type: String,
    pub clean_name: Option<String>,
    pub clean_brand: Option<String>,
    pub clean_model: Option<String>,
    pub clean_size: Option<String>,
    pub clean_colorway: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A customer-facing parent product grouping variants under one brand + model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ParentRow {
    pub id: Uuid,
    pub brand: String,
    pub model: String,
    /// Legacy; colorway is normally a variant attribute.
    pub colorway: Option<String>,
    pub display_name: String,
    pub product_type: String,
    pub display_price: Option<i64>,
    /// Always the sum of the variants' stock after a recompute.
    pub aggregate_stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct VariantRow {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub external_item_id: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub condition: Option<String>,
    pub variant_label: Option<String>,
    /// Overrides the parent display price when present.
    pub price: Option<i64>,
    pub stock_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of upserting a raw row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawUpsert {
    #[sqlx(flatten)]
    pub row: RawProductRow,
    pub inserted: bool,
}

/// Result of upserting a variant; `previous_parent_id` is set when the
/// variant already existed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UpsertedVariant {
    #[sqlx(flatten)]
    pub variant: VariantRow,
    pub previous_parent_id: Option<Uuid>,
}

impl UpsertedVariant {
    /// The parent the variant was detached from, if it moved.
    #[must_use]
    pub fn moved_from(&self) -> Option<Uuid> {
        self.previous_parent_id
            .filter(|prev| *prev != self.variant.parent_id)
    }
}

/// Classification fields stamped on a raw row once it is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanFields {
    pub clean_name: String,
    pub clean_brand: Option<String>,
    pub clean_model: Option<String>,
    pub clean_size: Option<String>,
    pub clean_colorway: Option<String>,
    pub product_type: ProductType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParent {
    pub brand: String,
    pub model: String,
    pub product_type: ProductType,
    pub display_price: Option<i64>,
}

impl NewParent {
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.brand, self.model)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantUpsert {
    pub parent_id: Uuid,
    pub external_item_id: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub condition: Option<String>,
    pub variant_label: Option<String>,
    pub price: Option<i64>,
    pub stock_count: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentFilter {
    /// Case-insensitive exact brand match.
    pub brand: Option<String>,
    pub in_stock: bool,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct BrandCount {
    pub brand: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogMetadata {
    pub total_products: i64,
    pub in_stock_products: i64,
    pub brands: Vec<BrandCount>,
}

const RAW_COLUMNS: &str = "id, external_id, display_name, price, stock_count, is_normalized, \
     product_type, clean_name, clean_brand, clean_model, clean_size, clean_colorway, \
     created_at, updated_at";

const PARENT_COLUMNS: &str = "id, brand, model, colorway, display_name, product_type, \
     price AS display_price, stock_count AS aggregate_stock, created_at, updated_at";

const VARIANT_COLUMNS: &str = "id, parent_id, external_item_id, size, color, condition, \
     variant_label, price, stock_count, created_at, updated_at";

// ---------------------------------------------------------------------------
// raw row operations
// ---------------------------------------------------------------------------

/// Upserts a raw mirror row keyed by `external_id`.
///
/// A fresh row starts with `is_normalized = FALSE`. On conflict only the
/// upstream-owned fields (`display_name`, `price`, `stock_count`) change;
/// normalization state and clean fields are left alone.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_raw_item(pool: &PgPool, item: &RawItem) -> Result<RawUpsert, DbError> {
    let sql = format!(
        "INSERT INTO products (id, external_id, display_name, price, stock_count) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (external_id) DO UPDATE SET \
             display_name = EXCLUDED.display_name, \
             price        = EXCLUDED.price, \
             stock_count  = EXCLUDED.stock_count, \
             updated_at   = NOW() \
         RETURNING {RAW_COLUMNS}, (xmax = 0) AS inserted"
    );

    let row = sqlx::query_as::<_, RawUpsert>(&sql)
        .bind(Uuid::new_v4())
        .bind(&item.external_id)
        .bind(&item.display_name)
        .bind(item.unit_price)
        .bind(item.stock_count.max(0))
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Returns up to `limit` raw rows still waiting for classification, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_unnormalized(
    pool: &PgPool,
    limit: i64,
    require_stock: bool,
) -> Result<Vec<RawProductRow>, DbError> {
    let sql = format!(
        "SELECT {RAW_COLUMNS} FROM products \
         WHERE NOT is_parent AND NOT is_normalized \
           AND (NOT $2 OR stock_count > 0) \
         ORDER BY created_at, id \
         LIMIT $1"
    );

    let rows = sqlx::query_as::<_, RawProductRow>(&sql)
        .bind(limit)
        .bind(require_stock)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Flags a raw row as processed and stamps its clean fields.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no raw row has this id.
pub async fn mark_normalized(pool: &PgPool, id: Uuid, clean: &CleanFields) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE products SET \
             is_normalized  = TRUE, \
             clean_name     = $2, \
             clean_brand    = $3, \
             clean_model    = $4, \
             clean_size     = $5, \
             clean_colorway = $6, \
             product_type   = $7, \
             updated_at     = NOW() \
         WHERE id = $1 AND NOT is_parent",
    )
    .bind(id)
    .bind(&clean.clean_name)
    .bind(&clean.clean_brand)
    .bind(&clean.clean_model)
    .bind(&clean.clean_size)
    .bind(&clean.clean_colorway)
    .bind(clean.product_type.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_raw_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<RawProductRow>, DbError> {
    let sql = format!("SELECT {RAW_COLUMNS} FROM products WHERE external_id = $1");
    let row = sqlx::query_as::<_, RawProductRow>(&sql)
        .bind(external_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Overwrites a raw row's stock. Returns `false` if the item is unknown.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_raw_stock(
    pool: &PgPool,
    external_id: &str,
    stock_count: i32,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE products SET stock_count = $2, updated_at = NOW() \
         WHERE external_id = $1 AND NOT is_parent",
    )
    .bind(external_id)
    .bind(stock_count.max(0))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// parent operations
// ---------------------------------------------------------------------------

/// Exact `(brand, model)` lookup.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_parent(
    pool: &PgPool,
    brand: &str,
    model: &str,
) -> Result<Option<ParentRow>, DbError> {
    let sql = format!(
        "SELECT {PARENT_COLUMNS} FROM products \
         WHERE is_parent AND brand = $1 AND model = $2"
    );
    let row = sqlx::query_as::<_, ParentRow>(&sql)
        .bind(brand)
        .bind(model)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Inserts a parent with zero aggregate stock.
///
/// If a concurrent writer already created the same `(brand, model)`, the
/// existing parent is returned unchanged.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_parent(pool: &PgPool, parent: &NewParent) -> Result<ParentRow, DbError> {
    let sql = format!(
        "INSERT INTO products \
             (id, display_name, price, stock_count, is_parent, is_normalized, \
              brand, model, product_type) \
         VALUES ($1, $2, $3, 0, TRUE, TRUE, $4, $5, $6) \
         ON CONFLICT (brand, model) WHERE is_parent DO UPDATE SET \
             brand = products.brand \
         RETURNING {PARENT_COLUMNS}"
    );

    let row = sqlx::query_as::<_, ParentRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(parent.display_name())
        .bind(parent.display_price)
        .bind(&parent.brand)
        .bind(&parent.model)
        .bind(parent.product_type.as_str())
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_parent(pool: &PgPool, id: Uuid) -> Result<Option<ParentRow>, DbError> {
    let sql = format!("SELECT {PARENT_COLUMNS} FROM products WHERE is_parent AND id = $1");
    let row = sqlx::query_as::<_, ParentRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_parent_ids(pool: &PgPool) -> Result<Vec<Uuid>, DbError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM products WHERE is_parent ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Writes `SUM(variants.stock_count)` into the parent's aggregate stock.
///
/// Single statement, so the sum and the write see the same snapshot.
/// Returns the new aggregate, or `None` if the parent does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn recompute_parent_stock(pool: &PgPool, parent_id: Uuid) -> Result<Option<i32>, DbError> {
    let total = sqlx::query_scalar::<_, i32>(
        "UPDATE products p SET \
             stock_count = COALESCE( \
                 (SELECT SUM(v.stock_count) FROM variants v WHERE v.parent_id = p.id), 0 \
             )::INTEGER, \
             updated_at = NOW() \
         WHERE p.id = $1 AND p.is_parent \
         RETURNING p.stock_count",
    )
    .bind(parent_id)
    .fetch_optional(pool)
    .await?;

    Ok(total)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_parents(pool: &PgPool, filter: &ParentFilter) -> Result<Vec<ParentRow>, DbError> {
    let sql = format!(
        "SELECT {PARENT_COLUMNS} FROM products \
         WHERE is_parent \
           AND ($1::TEXT IS NULL OR LOWER(brand) = LOWER($1)) \
           AND (NOT $2 OR stock_count > 0) \
         ORDER BY brand, model, id \
         LIMIT $3 OFFSET $4"
    );

    let rows = sqlx::query_as::<_, ParentRow>(&sql)
        .bind(filter.brand.as_deref())
        .bind(filter.in_stock)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Counts parents matching the brand and stock filters of `filter`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_parents(pool: &PgPool, filter: &ParentFilter) -> Result<i64, DbError> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM products \
         WHERE is_parent \
           AND ($1::TEXT IS NULL OR LOWER(brand) = LOWER($1)) \
           AND (NOT $2 OR stock_count > 0)",
    )
    .bind(filter.brand.as_deref())
    .bind(filter.in_stock)
    .fetch_one(pool)
    .await?;

    Ok(total)
}

/// Totals for storefront filters, computed with aggregates over parents.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn catalog_metadata(pool: &PgPool) -> Result<CatalogMetadata, DbError> {
    let (total_products, in_stock_products): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE stock_count > 0) \
         FROM products WHERE is_parent",
    )
    .fetch_one(pool)
    .await?;

    let brands = sqlx::query_as::<_, BrandCount>(
        "SELECT brand, COUNT(*) AS count FROM products \
         WHERE is_parent GROUP BY brand ORDER BY brand",
    )
    .fetch_all(pool)
    .await?;

    Ok(CatalogMetadata {
        total_products,
        in_stock_products,
        brands,
    })
}

// ---------------------------------------------------------------------------
// variant operations
// ---------------------------------------------------------------------------

/// Upserts a variant keyed by `external_item_id`.
///
/// Re-normalizing the same raw item updates the existing variant (and may
/// move it to another parent) instead of inserting a duplicate.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_variant(pool: &PgPool, v: &VariantUpsert) -> Result<UpsertedVariant, DbError> {
    let sql = format!(
        "WITH prev AS ( \
             SELECT parent_id FROM variants WHERE external_item_id = $2 \
         ) \
         INSERT INTO variants \
             (id, parent_id, external_item_id, size, color, condition, \
              variant_label, price, stock_count) \
         VALUES ($1, $3, $2, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (external_item_id) DO UPDATE SET \
             parent_id     = EXCLUDED.parent_id, \
             size          = EXCLUDED.size, \
             color         = EXCLUDED.color, \
             condition     = EXCLUDED.condition, \
             variant_label = EXCLUDED.variant_label, \
             price         = EXCLUDED.price, \
             stock_count   = EXCLUDED.stock_count, \
             updated_at    = NOW() \
         RETURNING {VARIANT_COLUMNS}, (SELECT parent_id FROM prev) AS previous_parent_id"
    );

    let row = sqlx::query_as::<_, UpsertedVariant>(&sql)
        .bind(Uuid::new_v4())
        .bind(&v.external_item_id)
        .bind(v.parent_id)
        .bind(&v.size)
        .bind(&v.color)
        .bind(&v.condition)
        .bind(&v.variant_label)
        .bind(v.price)
        .bind(v.stock_count.max(0))
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_variant_by_external_id(
    pool: &PgPool,
    external_item_id: &str,
) -> Result<Option<VariantRow>, DbError> {
    let sql = format!("SELECT {VARIANT_COLUMNS} FROM variants WHERE external_item_id = $1");
    let row = sqlx::query_as::<_, VariantRow>(&sql)
        .bind(external_item_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Sets a variant's stock and, when `price` is given, its price.
///
/// Returns the owning parent id so the caller can recompute it, or `None`
/// if no variant carries this external id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_variant_inventory(
    pool: &PgPool,
    external_item_id: &str,
    stock_count: i32,
    price: Option<i64>,
) -> Result<Option<Uuid>, DbError> {
    let parent_id = sqlx::query_scalar::<_, Uuid>(
        "UPDATE variants SET \
             stock_count = $2, \
             price       = COALESCE($3, price), \
             updated_at  = NOW() \
         WHERE external_item_id = $1 \
         RETURNING parent_id",
    )
    .bind(external_item_id)
    .bind(stock_count.max(0))
    .bind(price)
    .fetch_optional(pool)
    .await?;

    Ok(parent_id)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_variants(pool: &PgPool, parent_id: Uuid) -> Result<Vec<VariantRow>, DbError> {
    let sql = format!(
        "SELECT {VARIANT_COLUMNS} FROM variants WHERE parent_id = $1 \
         ORDER BY size NULLS LAST, variant_label NULLS LAST, id"
    );
    let rows = sqlx::query_as::<_, VariantRow>(&sql)
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
