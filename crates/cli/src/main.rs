use std::process::ExitCode;

fn main() -> ExitCode {
    deckbot_cli::run()
}
