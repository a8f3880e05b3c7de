//! Core types for ExaltRide.
//!
//! This module provides type-safe wrappers for the storefront's client-side
//! state: identifiers, prices, cart line items, wishlist entries and the
//! selected car used for compatibility hints.

pub mod car;
pub mod cart;
pub mod id;
pub mod keyed;
pub mod price;
pub mod wishlist;

pub use car::{Compatibility, Fitment, SelectedCar};
pub use cart::CartLineItem;
pub use id::{GuestId, ProductId};
pub use keyed::{Keyed, revert_keys};
pub use price::Price;
pub use wishlist::WishlistItem;
