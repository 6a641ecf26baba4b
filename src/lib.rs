//! pollcast: live poll fan-out and vote timeseries reconstruction.

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Domain
pub mod connection_manager;
pub mod events;
pub mod store;
pub mod timeseries;

// Application layer
pub mod api;
pub mod server;
pub mod sse;
pub mod triggers;
pub mod websocket;

// Supporting modules
pub mod shutdown;
pub mod tasks;
