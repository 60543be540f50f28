//! Claims-based authorization.
//!
//! Named [`policy::Policy`] values are built from configuration at startup. Each is a conjunction
//! of requirements: an authenticated principal, an exact claim match, or a custom check
//! dispatched through the [`registry::HandlerRegistry`]. The only custom check shipped is
//! [`ownership::OwnershipHandler`], which asks a [`ownership::ResourceOwnership`] collaborator
//! whether the principal owns the targeted resource.
//!
//! Routes opt in with [`middleware::require_policy`]:
//!
//! ```ignore
//! let route = require_policy(get(get_photo), &state, names::MUST_OWN_PHOTO)?;
//! ```
//!
//! Deny reasons are logged with the policy name and never returned to the client.

pub mod evaluator;
pub mod middleware;
pub mod ownership;
pub mod policy;
pub mod registry;
