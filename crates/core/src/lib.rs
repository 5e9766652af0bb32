//! Dawajen Core - Shared types library.
//!
//! This crate provides the domain types used across the Dawajen components:
//! - `storefront` - Product cache, catalog pipeline, table-store client and JSON API
//! - `cli` - Command-line tools for browsing the catalog and managing the cache
//!
//! # Architecture
//!
//! The core crate contains only types and pure conversions - no I/O, no HTTP
//! clients. Rows coming back from the hosted table-store are validated here
//! (see [`types::product::ProductRow`]) so every other crate works with
//! well-formed records.
//!
//! # Modules
//!
//! - [`types`] - IDs, bilingual text, prices, products, orders and account records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
