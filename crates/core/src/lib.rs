//! Domain logic for the Stride workflow backend: initiative and goal state
//! machines, capability resolution, transition guards, domain events and
//! notification types. No I/O lives here.

#[macro_use]
mod macros;

pub mod authorizer;
pub mod capabilities;
pub mod error;
pub mod events;
pub mod goal;
pub mod initiative;
pub mod notification;
pub mod types;
