//! Real-time delivery of persisted notifications.

pub mod dispatcher;

pub use dispatcher::{DeliveryReport, Dispatcher};
