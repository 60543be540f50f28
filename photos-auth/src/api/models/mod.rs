pub mod auth;
pub mod photos;
