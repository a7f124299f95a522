//! Client side of the room socket: backoff policy, reconnection state
//! machine and a tokio-tungstenite driver.

pub mod backoff;
pub mod client;
pub mod controller;

pub use backoff::Backoff;
pub use client::{ClientError, TabletopClient};
pub use controller::{Controller, Status};
