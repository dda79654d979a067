//! Which cart an identity resolves to, given what lookups found.

use stockroom_core::Identity;
use stockroom_db::CartRow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// Absorb the session cart into the user cart, then drop the session cart.
    Merge { user: CartRow, session: CartRow },
    /// Returning user; nothing to merge.
    UseUser(CartRow),
    /// First login with only an anonymous cart: flip its owner to the user.
    Rehome(CartRow),
    CreateForUser(String),
    UseSession(CartRow),
    CreateForSession(String),
}

/// `None` when the identity carries neither key.
pub(crate) fn resolve(
    identity: &Identity,
    user_cart: Option<CartRow>,
    session_cart: Option<CartRow>,
) -> Option<Resolution> {
    match (&identity.user_id, &identity.session_id) {
        (Some(user_id), _) => Some(match (user_cart, session_cart) {
            (Some(user), Some(session)) => Resolution::Merge { user, session },
            (Some(user), None) => Resolution::UseUser(user),
            (None, Some(session)) => Resolution::Rehome(session),
            (None, None) => Resolution::CreateForUser(user_id.clone()),
        }),
        (None, Some(session_id)) => Some(match session_cart {
            Some(session) => Resolution::UseSession(session),
            None => Resolution::CreateForSession(session_id.clone()),
        }),
        (None, None) => None,
    }
}
