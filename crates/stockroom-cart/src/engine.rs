//! Cart identity resolution, merge, and item mutations.
//!
//! Mutations take a cart id the caller has already authorized with
//! [`CartEngine::authorize`]. Every successful mutation re-stamps the cart's
//! `updated_at` from the injected clock.

use std::sync::Arc;

use stockroom_core::{CartLimits, Clock, Identity};
use stockroom_db::{CartItemRow, CartOwner, CartRow, CartStore, NewCart};
use uuid::Uuid;

use crate::error::CartError;
use crate::merge::plan_merge;
use crate::model::Cart;
use crate::resolve::{resolve, Resolution};

#[derive(Clone)]
pub struct CartEngine {
    store: Arc<dyn CartStore>,
    clock: Arc<dyn Clock>,
    limits: CartLimits,
}

impl std::fmt::Debug for CartEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartEngine")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl CartEngine {
    #[must_use]
    pub fn new(store: Arc<dyn CartStore>, clock: Arc<dyn Clock>, limits: CartLimits) -> Self {
        Self {
            store,
            clock,
            limits,
        }
    }

    #[must_use]
    pub fn limits(&self) -> CartLimits {
        self.limits
    }

    async fn load(&self, row: CartRow) -> Result<Cart, CartError> {
        let items = self.store.list_cart_items(row.id).await?;
        Ok(Cart::assemble(row, items))
    }

    async fn reload(&self, cart_id: Uuid) -> Result<Cart, CartError> {
        let row = self
            .store
            .get_cart(cart_id)
            .await?
            .ok_or(CartError::CartNotFound)?;
        self.load(row).await
    }

    fn validate_quantity(&self, quantity: i32) -> Result<(), CartError> {
        if quantity < 1 || quantity > self.limits.max_item_quantity {
            return Err(CartError::Validation(format!(
                "quantity must be between 1 and {}",
                self.limits.max_item_quantity
            )));
        }
        Ok(())
    }

    /// Resolves the caller's cart, merging or re-homing an anonymous cart on
    /// first login and creating one if none exists.
    ///
    /// # Errors
    ///
    /// - [`CartError::IdentityRequired`] when the identity is empty.
    /// - [`CartError::QuantityLimit`] or [`CartError::CartFull`] when a merge
    ///   would break a cart limit; neither cart is changed.
    /// - [`CartError::Store`] on store failure.
    pub async fn get_or_create_cart(&self, identity: &Identity) -> Result<Cart, CartError> {
        let user_cart = match &identity.user_id {
            Some(user_id) => self.store.latest_user_cart(user_id).await?,
            None => None,
        };
        let session_cart = match &identity.session_id {
            Some(session_id) => self.store.latest_session_cart(session_id).await?,
            None => None,
        };

        match resolve(identity, user_cart, session_cart).ok_or(CartError::IdentityRequired)? {
            Resolution::Merge { user, session } => self.merge(user, session).await,
            Resolution::UseUser(row) | Resolution::UseSession(row) => self.load(row).await,
            Resolution::Rehome(session) => {
                let Some(user_id) = identity.user_id.as_deref() else {
                    return Err(CartError::IdentityRequired);
                };
                let row = self
                    .store
                    .rehome_cart(session.id, user_id, self.clock.now())
                    .await?;
                tracing::info!(cart_id = %row.id, "anonymous cart re-homed to user");
                self.load(row).await
            }
            Resolution::CreateForUser(user_id) => self.create(CartOwner::User(user_id)).await,
            Resolution::CreateForSession(session_id) => {
                self.create(CartOwner::Session(session_id)).await
            }
        }
    }

    async fn merge(&self, user: CartRow, session: CartRow) -> Result<Cart, CartError> {
        let user_items = self.store.list_cart_items(user.id).await?;
        let session_items = self.store.list_cart_items(session.id).await?;
        let writes = plan_merge(&user_items, &session_items, self.limits)?;

        self.store
            .apply_merge(user.id, session.id, &writes, self.clock.now())
            .await?;
        tracing::info!(
            user_cart = %user.id,
            session_cart = %session.id,
            writes = writes.len(),
            "session cart merged into user cart"
        );
        self.reload(user.id).await
    }

    /// Evicts the owner's oldest carts down to `cap - 1`, then inserts a fresh one.
    async fn create(&self, owner: CartOwner) -> Result<Cart, CartError> {
        let existing = self.store.list_owner_carts(&owner).await?;
        let keep = self.limits.max_carts_per_owner.saturating_sub(1);
        if existing.len() > keep {
            let evict = existing.len() - keep;
            for old in existing.iter().take(evict) {
                self.store.delete_cart(old.id).await?;
            }
            tracing::info!(evicted = evict, "oldest carts evicted before creating a new one");
        }

        let row = self
            .store
            .insert_cart(&NewCart {
                id: Uuid::new_v4(),
                owner,
                now: self.clock.now(),
            })
            .await?;
        Ok(Cart::assemble(row, Vec::new()))
    }

    /// Loads a cart after checking the caller owns it.
    ///
    /// # Errors
    ///
    /// [`CartError::CartNotFound`] if the cart does not exist,
    /// [`CartError::Forbidden`] if it belongs to someone else.
    pub async fn authorize(&self, cart_id: Uuid, identity: &Identity) -> Result<Cart, CartError> {
        let row = self
            .store
            .get_cart(cart_id)
            .await?
            .ok_or(CartError::CartNotFound)?;
        if !identity.owns(row.user_id.as_deref(), row.session_id.as_deref()) {
            return Err(CartError::Forbidden);
        }
        self.load(row).await
    }

    async fn increment(
        &self,
        cart_id: Uuid,
        existing: &CartItemRow,
        quantity: i32,
    ) -> Result<(), CartError> {
        let combined = existing.quantity.saturating_add(quantity);
        if combined > self.limits.max_item_quantity {
            return Err(CartError::QuantityLimit {
                product_id: existing.product_id,
                requested: combined,
                max: self.limits.max_item_quantity,
            });
        }
        self.store
            .update_item_quantity(cart_id, existing.id, combined, self.clock.now())
            .await?
            .ok_or(CartError::ItemNotFound)?;
        Ok(())
    }

    /// Adds `quantity` of a product, incrementing an existing line.
    ///
    /// # Errors
    ///
    /// - [`CartError::Validation`] for a quantity outside `1..=max`.
    /// - [`CartError::QuantityLimit`] if the line total would exceed the cap.
    /// - [`CartError::CartFull`] if a new line would exceed the item cap.
    /// - [`CartError::CartNotFound`] or [`CartError::Store`].
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, CartError> {
        self.validate_quantity(quantity)?;
        self.store
            .get_cart(cart_id)
            .await?
            .ok_or(CartError::CartNotFound)?;

        let items = self.store.list_cart_items(cart_id).await?;
        if let Some(existing) = items.iter().find(|i| i.product_id == product_id) {
            self.increment(cart_id, existing, quantity).await?;
        } else {
            if items.len() >= self.limits.max_cart_items {
                return Err(CartError::CartFull {
                    max: self.limits.max_cart_items,
                });
            }
            let inserted = self
                .store
                .insert_item(cart_id, product_id, quantity, self.clock.now())
                .await?;
            if inserted.is_none() {
                // Lost an insert race for the same product; retry once as an increment.
                tracing::debug!(%cart_id, %product_id, "concurrent add detected, retrying as update");
                let items = self.store.list_cart_items(cart_id).await?;
                let existing = items
                    .iter()
                    .find(|i| i.product_id == product_id)
                    .ok_or(CartError::ItemNotFound)?;
                self.increment(cart_id, existing, quantity).await?;
            }
        }

        self.store.touch_cart(cart_id, self.clock.now()).await?;
        self.reload(cart_id).await
    }

    /// Sets a line's quantity. Zero is rejected; use [`remove_item`](Self::remove_item).
    ///
    /// # Errors
    ///
    /// [`CartError::Validation`], [`CartError::ItemNotFound`],
    /// [`CartError::CartNotFound`], or [`CartError::Store`].
    pub async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, CartError> {
        self.validate_quantity(quantity)?;
        self.store
            .update_item_quantity(cart_id, item_id, quantity, self.clock.now())
            .await?
            .ok_or(CartError::ItemNotFound)?;
        self.store.touch_cart(cart_id, self.clock.now()).await?;
        self.reload(cart_id).await
    }

    /// # Errors
    ///
    /// [`CartError::ItemNotFound`], [`CartError::CartNotFound`], or
    /// [`CartError::Store`].
    pub async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<Cart, CartError> {
        if !self.store.delete_item(cart_id, item_id).await? {
            return Err(CartError::ItemNotFound);
        }
        self.store.touch_cart(cart_id, self.clock.now()).await?;
        self.reload(cart_id).await
    }

    /// Empties the cart; the cart itself remains.
    ///
    /// # Errors
    ///
    /// [`CartError::CartNotFound`] or [`CartError::Store`].
    pub async fn clear_cart(&self, cart_id: Uuid) -> Result<Cart, CartError> {
        self.store
            .get_cart(cart_id)
            .await?
            .ok_or(CartError::CartNotFound)?;
        let removed = self.store.clear_items(cart_id).await?;
        tracing::debug!(%cart_id, removed, "cart cleared");
        self.store.touch_cart(cart_id, self.clock.now()).await?;
        self.reload(cart_id).await
    }
}
