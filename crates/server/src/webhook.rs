use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use deckbot_line::{InboundWebhook, SIGNATURE_HEADER};
use tracing::{info_span, warn, Instrument};

use crate::app::{AppState, REQUEST_ID_HEADER};

/// Always answers 200 with an empty body. Rejections are only logged.
pub async fn receive_events(
    State(state): State<AppState>,
    Path(external_channel_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let correlation_id = header(&headers, REQUEST_ID_HEADER).unwrap_or("unknown").to_string();
    let inbound = InboundWebhook {
        external_channel_id,
        signature: header(&headers, SIGNATURE_HEADER).unwrap_or_default().to_string(),
        payload: body.to_vec(),
    };

    if let Some(field) = missing_field(&inbound) {
        warn!(
            event_name = "webhook.request.dropped",
            correlation_id = %correlation_id,
            external_channel_id = %inbound.external_channel_id,
            field,
            "webhook request missing required field"
        );
        return StatusCode::OK;
    }

    let span = info_span!(
        "webhook.request",
        correlation_id = %correlation_id,
        external_channel_id = %inbound.external_channel_id,
    );
    if let Err(error) = state.webhook.handle_inbound(&inbound).instrument(span).await {
        warn!(
            event_name = "webhook.request.rejected",
            correlation_id = %correlation_id,
            category = error.category().as_str(),
            error = %error,
            "webhook rejected"
        );
    }

    StatusCode::OK
}

/// Name of the first required part that is empty, if any.
fn missing_field(inbound: &InboundWebhook) -> Option<&'static str> {
    if inbound.external_channel_id.trim().is_empty() {
        Some("external_channel_id")
    } else if inbound.signature.trim().is_empty() {
        Some("signature")
    } else if inbound.payload.is_empty() {
        Some("body")
    } else {
        None
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
