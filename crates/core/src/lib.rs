//! Sundry Core - Shared domain types.
//!
//! This crate provides the types shared by the storefront service and its
//! integration tests:
//! - `storefront` - Cart, checkout and realtime sync over a hosted backend
//! - `integration-tests` - End-to-end cart flows against an in-memory backend
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no storage.
//! Every invariant that can be expressed in a type lives here (quantities are
//! never below one, IDs of different entities never mix).
//!
//! # Modules
//!
//! - [`types`] - IDs, quantities, prices, order status and email addresses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
