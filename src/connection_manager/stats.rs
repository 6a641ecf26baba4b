//! Registry statistics and info structures

use serde::Serialize;
use std::collections::HashMap;

/// Registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub total_channels: usize,
    /// Subscribers of the global channel
    pub global_subscribers: usize,
    pub channels: HashMap<String, usize>,
}

/// Channel information
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub subscriber_count: usize,
}
