//! Atelier Storefront library.
//!
//! The storefront and admin JSON API as a library, so the binary, the CLI
//! and the integration tests share one router and one set of services.
//!
//! - [`routes::router`] builds the axum application for an [`state::AppState`]
//! - [`services`] hold the business rules (cart merge, checkout, address book)
//! - [`db`] defines the store traits and their `PostgreSQL` implementation
//! - [`payments`] talks to the card processor
//! - [`cache`] is the tagged read-through response cache

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;
