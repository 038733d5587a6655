use std::sync::Arc;
use std::time::Duration;

use deckbot_core::config::{AppConfig, ConfigError, LoadOptions};
use deckbot_core::{ChannelId, ChannelService, ServiceError, SlideService};
use deckbot_db::{connect_with_settings, migrations, DbPool, SqlChannelRepository, SqlSlideRepository};
use deckbot_line::{
    EventPublisher, HmacSignatureVerifier, HttpEventBus, LineClient, MessageDispatcher,
    NoopEventPublisher, SlideCommandResponder, WebhookOrchestrator,
};
use thiserror::Error;
use tracing::info;

use crate::app::AppState;
use crate::slide::templates;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client setup failed: {0}")]
    HttpClient(#[source] ServiceError),
    #[error("template setup failed: {0}")]
    Templates(#[source] tera::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    bootstrap_with_config(AppConfig::load(options)?).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let line = Arc::new(
        LineClient::new(&config.line.api_base_url)
            .map_err(BootstrapError::HttpClient)?,
    );
    let publisher: Arc<dyn EventPublisher> = match &config.bus.endpoint {
        Some(endpoint) => Arc::new(
            HttpEventBus::new(
                endpoint,
                &config.bus.bus_name,
                config.bus.api_key.clone(),
                Duration::from_secs(config.bus.timeout_secs),
            )
            .map_err(BootstrapError::HttpClient)?,
        ),
        None => Arc::new(NoopEventPublisher),
    };
    info!(
        event_name = "system.bootstrap.delivery_mode",
        mode = config.webhook.mode.as_str(),
        bus = if config.bus.endpoint.is_some() { "http" } else { "noop" },
        "webhook delivery configured"
    );

    let channels = Arc::new(SqlChannelRepository::new(db_pool.clone()));
    let slides = Arc::new(SqlSlideRepository::new(db_pool.clone()));
    let deck_channel = ChannelId(config.slides.channel_id);

    let responder = SlideCommandResponder::new(
        slides.clone(),
        Arc::new(MessageDispatcher::new(line.clone())),
        deck_channel,
        config.webhook.slide_command.clone(),
    );
    let state = AppState {
        webhook: Arc::new(WebhookOrchestrator::new(
            channels.clone(),
            Arc::new(HmacSignatureVerifier),
            publisher,
            Arc::new(responder),
            config.webhook.mode,
        )),
        channels: Arc::new(ChannelService::new(channels, line)),
        slides: Arc::new(SlideService::new(slides)),
        deck_channel,
        delivery_mode: config.webhook.mode,
        templates: templates().map_err(BootstrapError::Templates)?,
    };

    Ok(Application { config, db_pool, state })
}
