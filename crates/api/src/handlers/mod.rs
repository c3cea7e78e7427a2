//! HTTP handlers. Each module backs one route group in [`crate::routes`].

pub mod goals;
pub mod initiatives;
pub mod notifications;
