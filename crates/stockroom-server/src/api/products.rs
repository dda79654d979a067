use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stockroom_db::{CatalogMetadata, ParentFilter, ParentRow, VariantRow};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct ProductListQuery {
    pub brand: Option<String>,
    pub in_stock: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    product_id: Uuid,
    brand: String,
    model: String,
    display_name: String,
    product_type: String,
    colorway: Option<String>,
    display_price: Option<i64>,
    aggregate_stock: i32,
    in_stock: bool,
    updated_at: DateTime<Utc>,
}

impl From<ParentRow> for ProductItem {
    fn from(row: ParentRow) -> Self {
        Self {
            product_id: row.id,
            in_stock: row.aggregate_stock > 0,
            brand: row.brand,
            model: row.model,
            display_name: row.display_name,
            product_type: row.product_type,
            colorway: row.colorway,
            display_price: row.display_price,
            aggregate_stock: row.aggregate_stock,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct PaginatedProducts {
    items: Vec<ProductItem>,
    /// Parents matching the filters across all pages.
    total: i64,
    next_offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct VariantItem {
    variant_id: Uuid,
    external_item_id: String,
    size: Option<String>,
    color: Option<String>,
    condition: Option<String>,
    variant_label: Option<String>,
    /// Variant price, or the parent's display price when the variant has none.
    price: Option<i64>,
    stock_count: i32,
    in_stock: bool,
}

impl VariantItem {
    fn new(row: VariantRow, parent_price: Option<i64>) -> Self {
        Self {
            variant_id: row.id,
            external_item_id: row.external_item_id,
            size: row.size,
            color: row.color,
            condition: row.condition,
            variant_label: row.variant_label,
            price: row.price.or(parent_price),
            in_stock: row.stock_count > 0,
            stock_count: row.stock_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ProductDetail {
    #[serde(flatten)]
    product: ProductItem,
    variants: Vec<VariantItem>,
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ApiResponse<PaginatedProducts>>, ApiError> {
    let filter = ParentFilter {
        brand: query
            .brand
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty()),
        in_stock: query.in_stock.unwrap_or(false),
        limit: normalize_limit(query.limit),
        offset: query.offset.unwrap_or(0).max(0),
    };

    let rows = state
        .catalog
        .list_parents(&filter)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let total = state
        .catalog
        .count_parents(&filter)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let page_end = filter.offset.saturating_add(filter.limit);
    let next_offset = (page_end < total).then_some(page_end);

    Ok(ApiResponse::ok(
        req_id.0,
        PaginatedProducts {
            items: rows.into_iter().map(ProductItem::from).collect(),
            total,
            next_offset,
        },
    ))
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<String>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let Ok(product_id) = Uuid::parse_str(&product_id) else {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "product id must be a UUID",
        ));
    };

    let parent = state
        .catalog
        .get_parent(product_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "product not found"))?;
    let variants = state
        .catalog
        .list_variants(parent.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let parent_price = parent.display_price;
    Ok(ApiResponse::ok(
        req_id.0,
        ProductDetail {
            product: ProductItem::from(parent),
            variants: variants
                .into_iter()
                .map(|v| VariantItem::new(v, parent_price))
                .collect(),
        },
    ))
}

pub(super) async fn catalog_metadata(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<CatalogMetadata>>, ApiError> {
    let metadata = state
        .catalog
        .catalog_metadata()
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::ok(req_id.0, metadata))
}
