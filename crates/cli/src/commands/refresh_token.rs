use std::sync::Arc;

use deckbot_core::{errors::ErrorKind, ChannelId, ChannelService};
use deckbot_db::SqlChannelRepository;
use deckbot_line::LineClient;

use crate::commands::{open_pool, prepare, CommandResult};

/// Issue a fresh channel access token and persist it with its expiry.
pub fn run(channel_id: i64) -> CommandResult {
    let (config, runtime) = match prepare("refresh-token") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let client = LineClient::new(&config.line.api_base_url)
            .map_err(|error| ("runtime_init", error.to_string(), 3u8))?;

        let service =
            ChannelService::new(Arc::new(SqlChannelRepository::new(pool.clone())), Arc::new(client));
        let refreshed = service.refresh_access_token(ChannelId(channel_id)).await.map_err(|error| {
            let (class, code) = match error.kind() {
                ErrorKind::ResourceNotFound => ("channel_not_found", 6u8),
                ErrorKind::External => ("platform_api", 7u8),
                _ => ("refresh_execution", 5u8),
            };
            (class, error.to_string(), code)
        });

        pool.close().await;
        refreshed
    });

    match result {
        Ok(channel) => CommandResult::success(
            "refresh-token",
            format!(
                "refreshed access token for channel {}; expires at {}",
                channel.id,
                channel.access_token_expired_at.to_rfc3339()
            ),
        ),
        Err(failure) => CommandResult::from_step("refresh-token", failure),
    }
}
