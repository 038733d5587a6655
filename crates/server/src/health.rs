use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use deckbot_core::config::DeliveryMode;
use deckbot_core::{ChannelId, SlideService};
use deckbot_db::{ping, DbPool};
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub slides: Arc<SlideService>,
    pub deck_channel: ChannelId,
    pub delivery_mode: DeliveryMode,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeckHealth {
    pub status: &'static str,
    pub channel_id: i64,
    pub pages: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub deck: DeckHealth,
    pub delivery_mode: &'static str,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/api/v1/health", get(health)).with_state(state)
}

/// Ready when the database answers. The deck is reported but an empty deck does not degrade.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match ping(&state.db_pool).await {
        Ok(()) => "ready",
        Err(error) => {
            warn!(event_name = "health.database.failed", error = %error, "database ping failed");
            "degraded"
        }
    };

    let deck = match state.slides.page_count(state.deck_channel).await {
        Ok(0) => DeckHealth { status: "empty", channel_id: state.deck_channel.0, pages: 0 },
        Ok(pages) => DeckHealth { status: "ready", channel_id: state.deck_channel.0, pages },
        Err(_) => DeckHealth { status: "unavailable", channel_id: state.deck_channel.0, pages: 0 },
    };

    let ready = database == "ready";
    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        deck,
        delivery_mode: state.delivery_mode.as_str(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use deckbot_core::config::DeliveryMode;
    use deckbot_core::{ChannelId, SlideService};
    use deckbot_db::{connect_with_settings, DbPool, InMemorySlideRepository};

    use crate::health::{health, HealthState};

    async fn state(db_pool: DbPool, pages: usize) -> HealthState {
        let slides = Arc::new(InMemorySlideRepository::default());
        if pages > 0 {
            let urls: Vec<String> = (1..=pages).map(|page| format!("https://cdn/{page}.png")).collect();
            slides.replace_pages(ChannelId(7), &urls).await;
        }
        HealthState {
            db_pool,
            slides: Arc::new(SlideService::new(slides)),
            deck_channel: ChannelId(7),
            delivery_mode: DeliveryMode::Reply,
        }
    }

    #[tokio::test]
    async fn reports_deck_size_and_delivery_mode() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let (status, Json(payload)) = health(State(state(pool.clone(), 3).await)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.deck.status, "ready");
        assert_eq!(payload.deck.channel_id, 7);
        assert_eq!(payload.deck.pages, 3);
        assert_eq!(payload.delivery_mode, "reply");

        pool.close().await;
    }

    #[tokio::test]
    async fn empty_deck_is_reported_without_degrading() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let (status, Json(payload)) = health(State(state(pool.clone(), 0).await)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.deck.status, "empty");
        assert_eq!(payload.deck.pages, 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_database_degrades_to_service_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) = health(State(state(pool, 1).await)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database, "degraded");
    }
}
