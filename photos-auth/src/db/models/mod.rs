//! Row and request types for the repositories in [`crate::db::handlers`].

pub mod photos;
pub mod tickets;
