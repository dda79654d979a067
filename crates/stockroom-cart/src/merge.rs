//! Session-into-user merge planning.
//!
//! The plan is fully validated before anything is written, so a rejected
//! merge leaves both carts as they were.

use stockroom_core::CartLimits;
use stockroom_db::{CartItemRow, MergeWrite};

use crate::error::CartError;

pub(crate) fn plan_merge(
    user_items: &[CartItemRow],
    session_items: &[CartItemRow],
    limits: CartLimits,
) -> Result<Vec<MergeWrite>, CartError> {
    let mut writes = Vec::with_capacity(session_items.len());
    let mut inserted = 0usize;

    for incoming in session_items {
        match user_items
            .iter()
            .find(|i| i.product_id == incoming.product_id)
        {
            Some(existing) => {
                let combined = existing.quantity.saturating_add(incoming.quantity);
                if combined > limits.max_item_quantity {
                    return Err(CartError::QuantityLimit {
                        product_id: incoming.product_id,
                        requested: combined,
                        max: limits.max_item_quantity,
                    });
                }
                writes.push(MergeWrite::SetQuantity {
                    item_id: existing.id,
                    quantity: combined,
                });
            }
            None => {
                inserted += 1;
                writes.push(MergeWrite::Insert {
                    product_id: incoming.product_id,
                    quantity: incoming.quantity,
                });
            }
        }
    }

    if user_items.len() + inserted > limits.max_cart_items {
        return Err(CartError::CartFull {
            max: limits.max_cart_items,
        });
    }
    Ok(writes)
}
