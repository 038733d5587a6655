use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use deckbot_core::{errors::ErrorKind, ChannelId};
use deckbot_db::SqlSlideRepository;
use deckbot_line::{
    LineClient, MessageDispatcher, SlideCommandResponder, SlideCommandWorker, WorkerOutcome,
};

use crate::commands::{open_pool, prepare, CommandResult};

/// Run the slide command worker on one bus event read from `path`, or stdin when absent.
pub fn run(path: Option<&Path>) -> CommandResult {
    let raw = match path {
        Some(path) => fs::read(path).map_err(|error| format!("{}: {error}", path.display())),
        None => {
            let mut buffer = Vec::new();
            io::stdin().read_to_end(&mut buffer).map(|_| buffer).map_err(|error| error.to_string())
        }
    };

    match raw {
        Ok(raw) => run_with_input(&raw),
        Err(message) => CommandResult::failure("handle-event", "invalid_input", message, 6),
    }
}

pub fn run_with_input(raw: &[u8]) -> CommandResult {
    let (config, runtime) = match prepare("handle-event") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let client = LineClient::new(&config.line.api_base_url)
            .map_err(|error| ("runtime_init", error.to_string(), 3u8))?;

        let responder = SlideCommandResponder::new(
            Arc::new(SqlSlideRepository::new(pool.clone())),
            Arc::new(MessageDispatcher::new(Arc::new(client))),
            ChannelId(config.slides.channel_id),
            config.webhook.slide_command.clone(),
        );
        let handled = SlideCommandWorker::new(Arc::new(responder)).handle(raw).await.map_err(
            |error| {
                let (class, code) = match error.kind() {
                    ErrorKind::Parameter => ("invalid_input", 6u8),
                    ErrorKind::ResourceNotFound => ("slide_not_found", 6u8),
                    ErrorKind::External => ("platform_api", 7u8),
                    ErrorKind::Internal => ("worker_execution", 5u8),
                };
                (class, error.to_string(), code)
            },
        );

        pool.close().await;
        handled
    });

    match result {
        Ok(WorkerOutcome::Replied) => {
            CommandResult::success("handle-event", "replied with the current slide")
        }
        Ok(WorkerOutcome::Ignored) => {
            CommandResult::success("handle-event", "ignored: not a slide command")
        }
        Err(failure) => CommandResult::from_step("handle-event", failure),
    }
}
