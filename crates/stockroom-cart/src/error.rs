use stockroom_db::DbError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CartError {
    #[error("{0}")]
    Validation(String),

    #[error("a session or user identity is required")]
    IdentityRequired,

    #[error("cart not found")]
    CartNotFound,

    #[error("cart item not found")]
    ItemNotFound,

    #[error("cart does not belong to the caller")]
    Forbidden,

    #[error("quantity {requested} for product {product_id} exceeds the limit of {max}")]
    QuantityLimit {
        product_id: Uuid,
        requested: i32,
        max: i32,
    },

    #[error("cart already holds the maximum of {max} distinct items")]
    CartFull { max: usize },

    #[error("store error: {0}")]
    Store(#[from] DbError),
}
