//! HTTP surface.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response bodies
//!
//! # Routes
//!
//! - **Authentication** (`/authentication/*`): federated login and callback, logout, the current
//!   principal and bearer token minting
//! - **Photos** (`/photos/*`): routes guarded by the `CanAddPhoto` and `MustOwnPhoto` policies

pub mod handlers;
pub mod models;
