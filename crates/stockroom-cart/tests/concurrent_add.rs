//! A lost insert race on `(cart_id, product_id)` is retried as an increment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stockroom_cart::CartEngine;
use stockroom_core::{CartLimits, Identity, SystemClock};
use stockroom_db::{
    CartItemRow, CartOwner, CartRow, CartStore, DbError, MemoryStore, MergeWrite, NewCart,
};
use uuid::Uuid;

/// Delegates to `MemoryStore`, but the first `insert_item` behaves as if a
/// concurrent request inserted the same product a moment earlier.
struct RacingStore {
    inner: MemoryStore,
    raced: AtomicBool,
}

#[async_trait]
impl CartStore for RacingStore {
    async fn latest_user_cart(&self, user_id: &str) -> Result<Option<CartRow>, DbError> {
        self.inner.latest_user_cart(user_id).await
    }
    async fn latest_session_cart(&self, session_id: &str) -> Result<Option<CartRow>, DbError> {
        self.inner.latest_session_cart(session_id).await
    }
    async fn get_cart(&self, id: Uuid) -> Result<Option<CartRow>, DbError> {
        self.inner.get_cart(id).await
    }
    async fn list_owner_carts(&self, owner: &CartOwner) -> Result<Vec<CartRow>, DbError> {
        self.inner.list_owner_carts(owner).await
    }
    async fn insert_cart(&self, cart: &NewCart) -> Result<CartRow, DbError> {
        self.inner.insert_cart(cart).await
    }
    async fn rehome_cart(
        &self,
        cart_id: Uuid,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CartRow, DbError> {
        self.inner.rehome_cart(cart_id, user_id, now).await
    }
    async fn delete_cart(&self, cart_id: Uuid) -> Result<bool, DbError> {
        self.inner.delete_cart(cart_id).await
    }
    async fn touch_cart(&self, cart_id: Uuid, now: DateTime<Utc>) -> Result<(), DbError> {
        self.inner.touch_cart(cart_id, now).await
    }
    async fn list_cart_items(&self, cart_id: Uuid) -> Result<Vec<CartItemRow>, DbError> {
        self.inner.list_cart_items(cart_id).await
    }
    async fn insert_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartItemRow>, DbError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.insert_item(cart_id, product_id, 2, now).await?;
        }
        self.inner.insert_item(cart_id, product_id, quantity, now).await
    }
    async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartItemRow>, DbError> {
        self.inner
            .update_item_quantity(cart_id, item_id, quantity, now)
            .await
    }
    async fn delete_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<bool, DbError> {
        self.inner.delete_item(cart_id, item_id).await
    }
    async fn clear_items(&self, cart_id: Uuid) -> Result<u64, DbError> {
        self.inner.clear_items(cart_id).await
    }
    async fn apply_merge(
        &self,
        user_cart_id: Uuid,
        session_cart_id: Uuid,
        writes: &[MergeWrite],
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.inner
            .apply_merge(user_cart_id, session_cart_id, writes, now)
            .await
    }
}

#[tokio::test]
async fn lost_insert_race_becomes_an_increment() {
    let store = Arc::new(RacingStore {
        inner: MemoryStore::new(),
        raced: AtomicBool::new(false),
    });
    let engine = CartEngine::new(store.clone(), Arc::new(SystemClock), CartLimits::default());

    let cart = engine
        .get_or_create_cart(&Identity::anonymous("s1"))
        .await
        .unwrap();
    let product = Uuid::new_v4();
    let cart = engine.add_item(cart.id, product, 3).await.unwrap();

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.quantity_of(product), Some(5));
}
