use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Html,
};
use deckbot_core::ServiceError;
use serde::Deserialize;
use tera::{Context, Tera};

use crate::api::ApiError;
use crate::app::AppState;

const SLIDE_TEMPLATE: &str = "slide.html";

#[derive(Debug, Deserialize)]
pub struct SlideQuery {
    pub page: Option<u32>,
}

pub fn templates() -> Result<Arc<Tera>, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_template(SLIDE_TEMPLATE, include_str!("../../../templates/slide.html"))?;
    Ok(Arc::new(tera))
}

/// Renders the requested page of the deck and makes it the deck's current page.
pub async fn slide_page(
    State(state): State<AppState>,
    query: Result<Query<SlideQuery>, QueryRejection>,
) -> Result<Html<String>, ApiError> {
    let Query(query) =
        query.map_err(|rejection| ServiceError::parameter("invalid page", rejection))?;
    let view = state.slides.present(state.deck_channel, query.page.unwrap_or(1)).await?;

    let mut context = Context::new();
    context.insert("slide", &view);
    let html = state
        .templates
        .render(SLIDE_TEMPLATE, &context)
        .map_err(|error| ServiceError::internal("failed to render slide", error))?;
    Ok(Html(html))
}
