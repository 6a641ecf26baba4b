//! API layer - HTTP endpoint handlers organized by domain.

mod connection;
mod health;
mod metrics;
mod routes;
mod timeseries;

pub use connection::{get_channel, list_channels};
pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
pub use timeseries::poll_timeseries;
