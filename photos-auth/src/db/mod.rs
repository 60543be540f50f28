//! Database access layer.
//!
//! Repositories in [`handlers`] wrap a `&mut PgConnection` and return the row types from
//! [`models`]. Errors are categorised into [`errors::DbError`] so callers can tell an unreachable
//! store apart from a constraint violation.
//!
//! Only the PostgreSQL storage backend touches this module; the in-memory backends used for
//! development and tests keep their state in process.

pub mod errors;
pub mod handlers;
pub mod models;
