//! ExaltRide Core - Shared domain types for the storefront.
//!
//! This crate provides the types and pure collection algebra used by the
//! storefront's cart and wishlist state containers:
//! - `storefront` - State containers, commerce API client and HTTP surface
//! - `integration-tests` - End-to-end tests against fake backends
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no clocks. Every cart or wishlist mutation is computed here as a
//! function of the current collection and the operation, which keeps the
//! optimistic update path synchronous and trivially testable.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, line items, wishlist entries and the selected car

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
