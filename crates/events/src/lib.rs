//! Stride event bus and notification rules.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`WorkflowEvent`]: a typed [`DomainEvent`](stride_core::events::DomainEvent)
//!   plus who caused it and when.
//! - [`EventPersistence`]: background service writing every event to the
//!   event log.
//! - [`NotificationService`]: turns a domain event into the notifications it
//!   produces.

pub mod bus;
pub mod notifications;
pub mod persistence;

pub use bus::{EventBus, WorkflowEvent};
pub use notifications::NotificationService;
pub use persistence::EventPersistence;
