pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "deckbot",
    about = "Deckbot operator CLI",
    long_about = "Apply migrations, inspect configuration, provision slide decks, refresh channel tokens, and replay bus events.",
    after_help = "Examples:\n  deckbot migrate\n  deckbot seed-deck --url https://cdn/1.png --url https://cdn/2.png\n  deckbot handle-event --file event.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Replace a channel's slide deck; the first page becomes current")]
    SeedDeck {
        #[arg(long, help = "Channel that owns the deck (defaults to slides.channel_id)")]
        channel_id: Option<i64>,
        #[arg(long = "url", required = true, help = "Page image URL, repeat in page order")]
        urls: Vec<String>,
    },
    #[command(about = "Issue a new channel access token and persist it")]
    RefreshToken {
        #[arg(long)]
        channel_id: i64,
    },
    #[command(about = "Run the slide command worker on one bus event")]
    HandleEvent {
        #[arg(long, help = "Read the event from this file instead of stdin")]
        file: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::SeedDeck { channel_id, urls } => commands::seed_deck::run(channel_id, urls),
        Command::RefreshToken { channel_id } => commands::refresh_token::run(channel_id),
        Command::HandleEvent { file } => commands::handle_event::run(file.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn seed_deck_collects_repeated_urls_in_order() {
        let cli = Cli::try_parse_from([
            "deckbot",
            "seed-deck",
            "--channel-id",
            "3",
            "--url",
            "https://cdn/1.png",
            "--url",
            "https://cdn/2.png",
        ])
        .expect("parse");

        match cli.command {
            Command::SeedDeck { channel_id, urls } => {
                assert_eq!(channel_id, Some(3));
                assert_eq!(urls, vec!["https://cdn/1.png", "https://cdn/2.png"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn refresh_token_requires_channel_id() {
        assert!(Cli::try_parse_from(["deckbot", "refresh-token"]).is_err());
    }
}
