//! Core types for Dawajen.
//!
//! This module provides type-safe wrappers for the storefront's domain concepts.

pub mod account;
pub mod id;
pub mod order;
pub mod phone;
pub mod price;
pub mod product;
pub mod text;

pub use account::{CartItem, Favorite, Profile, Role, Session};
pub use id::*;
pub use order::{
    Fulfillment, NewOrder, NewOrderItem, Order, OrderItem, OrderItemRow, OrderRow, OrderStatus,
};
pub use phone::{PhoneError, PhoneNumber};
pub use price::parse_price;
pub use product::{NewProduct, Product, ProductPatch, ProductRow, RowError};
pub use text::Bilingual;
