use deckbot_core::ChannelId;
use deckbot_db::{RepositoryError, SqlChannelRepository, SqlSlideRepository};

use crate::commands::{open_pool, prepare, CommandResult, StepFailure};

/// Replace the deck of `channel_id` with `urls`, in order, as pages `1..=n`.
pub fn run(channel_id: Option<i64>, urls: Vec<String>) -> CommandResult {
    let urls: Vec<String> =
        urls.into_iter().map(|url| url.trim().to_string()).filter(|url| !url.is_empty()).collect();
    if urls.is_empty() {
        return CommandResult::failure("seed-deck", "invalid_input", "at least one --url is required", 6);
    }

    let (config, runtime) = match prepare("seed-deck") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };
    let channel_id = ChannelId(channel_id.unwrap_or(config.slides.channel_id));

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;

        let seeded: Result<_, StepFailure> = async {
            SqlChannelRepository::new(pool.clone()).find_by_id(channel_id).await.map_err(
                |error| match error {
                    RepositoryError::NotFound(_) => (
                        "channel_not_found",
                        format!("channel {channel_id} is not registered"),
                        6u8,
                    ),
                    other => ("seed_execution", other.to_string(), 5u8),
                },
            )?;

            SqlSlideRepository::new(pool.clone())
                .replace_pages(channel_id, &urls)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))
        }
        .await;

        pool.close().await;
        seeded
    });

    match result {
        Ok(pages) => CommandResult::success(
            "seed-deck",
            format!("seeded {} page(s) for channel {channel_id}; page 1 is current", pages.len()),
        ),
        Err(failure) => CommandResult::from_step("seed-deck", failure),
    }
}
