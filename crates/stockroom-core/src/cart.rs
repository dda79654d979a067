use serde::{Deserialize, Serialize};

/// Bounds enforced by the cart engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLimits {
    pub max_item_quantity: i32,
    pub max_cart_items: usize,
    /// Retention cap per user, also applied per anonymous session.
    pub max_carts_per_owner: usize,
}

impl Default for CartLimits {
    fn default() -> Self {
        Self {
            max_item_quantity: 10,
            max_cart_items: 50,
            max_carts_per_owner: 5,
        }
    }
}

/// Who is asking, resolved before any cart operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn anonymous(session_id: impl Into<String>) -> Self {
        Self {
            user_id: None,
            session_id: Some(session_id.into()),
        }
    }

    #[must_use]
    pub fn user(user_id: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            session_id,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.session_id.is_none()
    }

    /// Ownership check for a cart's owner keys.
    ///
    /// A cart with a user id belongs to that user only. An ownerless cart
    /// belongs to whoever holds its session id.
    #[must_use]
    pub fn owns(&self, cart_user_id: Option<&str>, cart_session_id: Option<&str>) -> bool {
        match cart_user_id {
            Some(owner) => self.user_id.as_deref() == Some(owner),
            None => cart_session_id.is_some() && self.session_id.as_deref() == cart_session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_cart_requires_matching_user() {
        let me = Identity::user("u1", Some("s1".to_string()));
        assert!(me.owns(Some("u1"), None));
        assert!(!me.owns(Some("u2"), Some("s1")));
    }

    #[test]
    fn session_cart_requires_matching_session() {
        let anon = Identity::anonymous("s1");
        assert!(anon.owns(None, Some("s1")));
        assert!(!anon.owns(None, Some("s2")));
        assert!(!anon.owns(Some("u1"), Some("s1")));
    }

    #[test]
    fn cart_without_any_owner_is_nobodys() {
        let anon = Identity::default();
        assert!(!anon.owns(None, None));
        assert!(anon.is_empty());
    }
}
