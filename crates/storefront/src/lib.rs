//! Sundry storefront library.
//!
//! Cart state for guests and signed-in shoppers, realtime cart sync and
//! checkout over a hosted backend (PostgREST-style tables, password auth and
//! a realtime change feed). The binary serves these as a JSON API.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod notice;
pub mod realtime;
pub mod routes;
pub mod state;
pub mod sync;
