use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use deckbot_core::{errors::ErrorKind, Channel, ServiceError};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::ApiError;
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    #[serde(rename = "externalChannelID", default)]
    pub external_channel_id: String,
    #[serde(rename = "externalChannelSecret", default)]
    pub external_channel_secret: String,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub id: i64,
    pub name: String,
    #[serde(rename = "externalChannelID")]
    pub external_channel_id: String,
    #[serde(rename = "externalChannelSecret")]
    pub external_channel_secret: String,
    pub created_at: String,
}

impl From<Channel> for ChannelResponse {
    fn from(channel: Channel) -> Self {
        Self {
            id: channel.id.0,
            name: channel.name,
            external_channel_id: channel.external_channel_id,
            external_channel_secret: channel.external_channel_secret.expose_secret().to_string(),
            created_at: channel.created_at.to_rfc3339(),
        }
    }
}

pub async fn create_channel(
    State(state): State<AppState>,
    payload: Result<Json<CreateChannelRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ChannelResponse>), ApiError> {
    let Json(request) = payload
        .map_err(|rejection| ServiceError::parameter("invalid request body", rejection))?;
    if request.external_channel_secret.trim().is_empty() {
        return Err(ServiceError::message(
            ErrorKind::Parameter,
            "externalChannelSecret must not be empty",
        )
        .into());
    }

    let channel = state
        .channels
        .create_channel(
            &request.external_channel_id,
            SecretString::from(request.external_channel_secret),
        )
        .await?;
    info!(
        event_name = "channel.created",
        channel_id = %channel.id,
        external_channel_id = %channel.external_channel_id,
        "channel registered"
    );

    Ok((StatusCode::CREATED, Json(channel.into())))
}
