//! Atelier Core - Shared domain types.
//!
//! This crate provides the types shared by every Atelier component:
//! - `storefront` - Public JSON API and admin console backend
//! - `cli` - Command-line tools for migrations, seeding and admin grants
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, money helpers and the order status machine

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
