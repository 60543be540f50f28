//! Repository implementations for database access.
//!
//! - [`Tickets`]: server-side authentication tickets, keyed by session id
//! - [`Photos`]: photo rows, used by the ownership check and the photo routes
//!
//! All repositories follow the same usage pattern:
//!
//! ```ignore
//! use photos_auth::db::handlers::{Repository, Tickets};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = pool.acquire().await?;
//!     let mut repo = Tickets::new(&mut conn);
//!     let ticket = repo.get_by_id("session-id".to_string()).await?;
//!     Ok(())
//! }
//! ```

pub mod photos;
pub mod repository;
pub mod tickets;

pub use photos::Photos;
pub use repository::Repository;
pub use tickets::Tickets;
