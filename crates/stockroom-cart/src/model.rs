use chrono::{DateTime, Utc};
use serde::Serialize;
use stockroom_db::{CartItemRow, CartRow};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            quantity: row.quantity,
        }
    }
}

/// A cart with its items, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub(crate) fn assemble(row: CartRow, items: Vec<CartItemRow>) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            session_id: row.session_id,
            items: items.into_iter().map(CartItem::from).collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    #[must_use]
    pub fn quantity_of(&self, product_id: Uuid) -> Option<i32> {
        self.items
            .iter()
            .find(|i| i.product_id == product_id)
            .map(|i| i.quantity)
    }

    #[must_use]
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i64::from(i.quantity)).sum()
    }
}
