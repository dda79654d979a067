//! Cart identity resolution and merge engine.
//!
//! Resolves a visitor's `{user_id, session_id}` to a single active cart,
//! merges an anonymous cart into the user's on first login, and enforces the
//! limits in [`CartLimits`](stockroom_core::CartLimits).

pub mod engine;
pub mod error;
pub mod model;

mod merge;
mod resolve;

pub use engine::CartEngine;
pub use error::CartError;
pub use model::{Cart, CartItem};
