//! WebSocket push channels.
//!
//! Provides the connection registry, heartbeat and liveness tasks, and the
//! HTTP upgrade handler mounted at `/api/v1/notifications/ws`.

mod handler;
mod heartbeat;
pub mod registry;

pub use handler::ws_handler;
pub use heartbeat::{start_heartbeat, start_liveness_monitor};
pub use registry::{ChannelHandle, ConnectionRegistry};
