//! Database operations for `carts` and `cart_items`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CartRow {
    pub id: Uuid,
    pub user_id: Option<String>,
    /// Only meaningful while `user_id` is null.
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CartItemRow {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The owner key a cart is looked up or counted by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(String),
    /// Anonymous visitor; matches ownerless carts only.
    Session(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCart {
    pub id: Uuid,
    pub owner: CartOwner,
    pub now: DateTime<Utc>,
}

/// One write of a validated session-into-user merge plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeWrite {
    SetQuantity { item_id: Uuid, quantity: i32 },
    Insert { product_id: Uuid, quantity: i32 },
}

const CART_COLUMNS: &str = "id, user_id, session_id, created_at, updated_at";
const ITEM_COLUMNS: &str = "id, cart_id, product_id, quantity, created_at, updated_at";

// ---------------------------------------------------------------------------
// cart operations
// ---------------------------------------------------------------------------

/// Most recently updated cart owned by `user_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_user_cart(pool: &PgPool, user_id: &str) -> Result<Option<CartRow>, DbError> {
    let sql = format!(
        "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 \
         ORDER BY updated_at DESC, id DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, CartRow>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Most recently updated ownerless cart for `session_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_session_cart(
    pool: &PgPool,
    session_id: &str,
) -> Result<Option<CartRow>, DbError> {
    let sql = format!(
        "SELECT {CART_COLUMNS} FROM carts WHERE session_id = $1 AND user_id IS NULL \
         ORDER BY updated_at DESC, id DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, CartRow>(&sql)
        .bind(session_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_cart(pool: &PgPool, id: Uuid) -> Result<Option<CartRow>, DbError> {
    let sql = format!("SELECT {CART_COLUMNS} FROM carts WHERE id = $1");
    let row = sqlx::query_as::<_, CartRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// All carts held by an owner, least recently updated first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_owner_carts(pool: &PgPool, owner: &CartOwner) -> Result<Vec<CartRow>, DbError> {
    let (filter, key) = match owner {
        CartOwner::User(id) => ("user_id = $1", id),
        CartOwner::Session(id) => ("session_id = $1 AND user_id IS NULL", id),
    };
    let sql = format!(
        "SELECT {CART_COLUMNS} FROM carts WHERE {filter} ORDER BY updated_at, id"
    );
    let rows = sqlx::query_as::<_, CartRow>(&sql)
        .bind(key)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_cart(pool: &PgPool, cart: &NewCart) -> Result<CartRow, DbError> {
    let (user_id, session_id) = match &cart.owner {
        CartOwner::User(id) => (Some(id.as_str()), None),
        CartOwner::Session(id) => (None, Some(id.as_str())),
    };
    let sql = format!(
        "INSERT INTO carts (id, user_id, session_id, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $4) RETURNING {CART_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CartRow>(&sql)
        .bind(cart.id)
        .bind(user_id)
        .bind(session_id)
        .bind(cart.now)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// Hands an anonymous cart to a user: sets `user_id`, clears `session_id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the cart does not exist.
pub async fn rehome_cart(
    pool: &PgPool,
    cart_id: Uuid,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<CartRow, DbError> {
    let sql = format!(
        "UPDATE carts SET user_id = $2, session_id = NULL, updated_at = $3 \
         WHERE id = $1 RETURNING {CART_COLUMNS}"
    );
    sqlx::query_as::<_, CartRow>(&sql)
        .bind(cart_id)
        .bind(user_id)
        .bind(now)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Deletes a cart; its items go with it via `ON DELETE CASCADE`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_cart(pool: &PgPool, cart_id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM carts WHERE id = $1")
        .bind(cart_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn touch_cart(pool: &PgPool, cart_id: Uuid, now: DateTime<Utc>) -> Result<(), DbError> {
    sqlx::query("UPDATE carts SET updated_at = $2 WHERE id = $1")
        .bind(cart_id)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// cart item operations
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_cart_items(pool: &PgPool, cart_id: Uuid) -> Result<Vec<CartItemRow>, DbError> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY created_at, id"
    );
    let rows = sqlx::query_as::<_, CartItemRow>(&sql)
        .bind(cart_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Inserts a line unless one for `(cart_id, product_id)` already exists.
///
/// Returns `None` when the unique constraint swallowed the insert, so the
/// caller can retry as a quantity update.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_item(
    pool: &PgPool,
    cart_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    now: DateTime<Utc>,
) -> Result<Option<CartItemRow>, DbError> {
    let sql = format!(
        "INSERT INTO cart_items (id, cart_id, product_id, quantity, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $5) \
         ON CONFLICT (cart_id, product_id) DO NOTHING \
         RETURNING {ITEM_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CartItemRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .bind(now)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_item_quantity(
    pool: &PgPool,
    cart_id: Uuid,
    item_id: Uuid,
    quantity: i32,
    now: DateTime<Utc>,
) -> Result<Option<CartItemRow>, DbError> {
    let sql = format!(
        "UPDATE cart_items SET quantity = $3, updated_at = $4 \
         WHERE id = $2 AND cart_id = $1 RETURNING {ITEM_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CartItemRow>(&sql)
        .bind(cart_id)
        .bind(item_id)
        .bind(quantity)
        .bind(now)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_item(pool: &PgPool, cart_id: Uuid, item_id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE id = $2 AND cart_id = $1")
        .bind(cart_id)
        .bind(item_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn clear_items(pool: &PgPool, cart_id: Uuid) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Applies a validated merge plan to the user cart and deletes the session
/// cart, all in one transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is committed then.
pub async fn apply_merge(
    pool: &PgPool,
    user_cart_id: Uuid,
    session_cart_id: Uuid,
    writes: &[MergeWrite],
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    for write in writes {
        match write {
            MergeWrite::SetQuantity { item_id, quantity } => {
                sqlx::query(
                    "UPDATE cart_items SET quantity = $3, updated_at = $4 \
                     WHERE id = $2 AND cart_id = $1",
                )
                .bind(user_cart_id)
                .bind(item_id)
                .bind(quantity)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            MergeWrite::Insert {
                product_id,
                quantity,
            } => {
                sqlx::query(
                    "INSERT INTO cart_items \
                         (id, cart_id, product_id, quantity, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(user_cart_id)
                .bind(product_id)
                .bind(quantity)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    sqlx::query("DELETE FROM carts WHERE id = $1")
        .bind(session_cart_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE carts SET updated_at = $2 WHERE id = $1")
        .bind(user_cart_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
