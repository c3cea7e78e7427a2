//! Request extractors.
//!
//! - [`auth::AuthUser`] -- the user id and role from a JWT Bearer token.
//! - [`auth::Actor`] -- the authenticated user resolved into an
//!   [`ActorContext`](stride_core::capabilities::ActorContext).

pub mod auth;
