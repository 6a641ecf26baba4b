//! Channel inspection endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::connection_manager::{Channel, ChannelInfo};
use crate::error::{AppError, Result};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct ChannelListResponse {
    pub channels: Vec<ChannelInfo>,
    pub total_channels: usize,
}

/// GET /api/v1/channels - List all channels with subscriber counts
pub async fn list_channels(State(state): State<AppState>) -> Json<ChannelListResponse> {
    let channels = state.registry.list_channels();
    let total = channels.len();

    Json(ChannelListResponse {
        channels,
        total_channels: total,
    })
}

/// GET /api/v1/channels/{name} - Get channel details
pub async fn get_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ChannelInfo>> {
    let channel: Channel = name.parse()?;
    state
        .registry
        .get_channel_info(&channel)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Channel '{}' not found or has no subscribers", name)))
}
