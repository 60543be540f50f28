//! Authentication.
//!
//! A request is authenticated by one of three schemes:
//!
//! ## 1. Cookie session
//!
//! Browser sign-in backed by the server-side [`ticket_store`]:
//! - the cookie (`PhotosApp.Auth` by default) carries only an opaque session id
//! - the serialized [`ticket::AuthTicket`] is kept in PostgreSQL or in memory
//! - sliding expiration renews the ticket in place once half of its window has elapsed
//!
//! ## 2. Bearer token from a cookie
//!
//! A signed JWT minted for an authenticated session and read from its own cookie rather than
//! the `Authorization` header. See [`bearer`].
//!
//! ## 3. Federated sign-in
//!
//! An external identity provider authenticates the user interactively; the callback result goes
//! through a claims transformer and ends in a cookie session. See [`federated`].
//!
//! [`selector::SchemeSelector`] runs the schemes in the configured order. Store failures and
//! corrupt tickets are logged and treated as "no session".
//!
//! # Modules
//!
//! - [`bearer`]: Bearer token signing keys and validation
//! - [`cookies`]: Cookie header parsing and `Set-Cookie` building
//! - [`current_principal`]: Handler extractor for the resolved principal
//! - [`federated`]: Identity provider and claims transformer seams
//! - [`selector`]: Scheme chain, sign-in, sign-out and challenge decisions
//! - [`sweeper`]: Periodic purge of expired tickets
//! - [`ticket`]: Principal, claims and ticket types
//! - [`ticket_format`]: Versioned binary framing of tickets
//! - [`ticket_store`]: Session persistence keyed by session id

pub mod bearer;
pub mod cookies;
pub mod current_principal;
pub mod federated;
pub mod selector;
pub mod sweeper;
pub mod ticket;
pub mod ticket_format;
pub mod ticket_store;
