//! HTTP surface for deckbot.
//!
//! - `POST /api/v1/webhook/line/{external_channel_id}/events` receives platform webhooks
//! - `POST /api/v1/channel/line/channels` registers a channel
//! - `GET  /slide?page=N` renders and persists the deck's current page
//! - `GET  /api/v1/health` reports readiness (untraced)

use std::sync::Arc;

use axum::{
    extract::Request,
    routing::{get, post},
    Router,
};
use deckbot_core::config::DeliveryMode;
use deckbot_core::{ChannelId, ChannelService, SlideService};
use deckbot_db::DbPool;
use deckbot_line::WebhookOrchestrator;
use tera::Tera;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info_span;

use crate::health::{self, HealthState};
use crate::{api, channels, slide, webhook};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub webhook: Arc<WebhookOrchestrator>,
    pub channels: Arc<ChannelService>,
    pub slides: Arc<SlideService>,
    pub deck_channel: ChannelId,
    pub delivery_mode: DeliveryMode,
    pub templates: Arc<Tera>,
}

pub fn router(state: AppState, db_pool: DbPool) -> Router {
    let health_state = HealthState {
        db_pool,
        slides: state.slides.clone(),
        deck_channel: state.deck_channel,
        delivery_mode: state.delivery_mode,
    };

    Router::new()
        .route("/api/v1/webhook/line/{external_channel_id}/events", post(webhook::receive_events))
        .route("/api/v1/channel/line/channels", post(channels::create_channel))
        .route("/slide", get(slide::slide_page))
        .with_state(state)
        .layer(CatchPanicLayer::custom(api::panic_response))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            info_span!(
                "http.request",
                method = %request.method(),
                path = request.uri().path(),
                correlation_id = correlation_id(request),
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .merge(health::router(health_state))
}

fn correlation_id(request: &Request) -> &str {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
}
