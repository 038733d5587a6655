use std::env;
use std::sync::{Mutex, OnceLock};

use chrono::{Duration, Utc};
use deckbot_cli::commands::{config, handle_event, migrate, seed_deck};
use deckbot_core::{ChannelId, NewChannel};
use deckbot_db::{connect_with_settings, migrations, SqlChannelRepository, SqlSlideRepository};
use secrecy::SecretString;
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("DECKBOT_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("DECKBOT_DATABASE_URL", "postgres://localhost/deckbot")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_deck_replaces_pages_for_registered_channel() {
    let dir = TempDir::new().expect("tempdir");
    let url = file_database_url(&dir);
    let channel_id = register_channel(&url);

    with_env(&[("DECKBOT_DATABASE_URL", url.as_str())], || {
        let urls = vec!["https://cdn/1.png".to_string(), "https://cdn/2.png".to_string()];
        let result = seed_deck::run(Some(channel_id.0), urls);
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed-deck");
        assert!(payload["message"].as_str().unwrap_or_default().contains("seeded 2 page(s)"));
    });

    let pages = block_on(async {
        let pool = connect_with_settings(&url, 1, 5).await.expect("connect");
        SqlSlideRepository::new(pool).list_pages(channel_id).await.expect("pages")
    });
    assert_eq!(pages.len(), 2);
    assert!(pages[0].current);
    assert!(!pages[1].current);
}

#[test]
fn seed_deck_reports_unknown_channel() {
    let dir = TempDir::new().expect("tempdir");
    let url = file_database_url(&dir);

    with_env(&[("DECKBOT_DATABASE_URL", url.as_str())], || {
        let result = seed_deck::run(Some(42), vec!["https://cdn/1.png".to_string()]);
        assert_eq!(result.exit_code, 6);
        assert_eq!(parse_payload(&result.output)["error_class"], "channel_not_found");
    });
}

#[test]
fn seed_deck_requires_at_least_one_url() {
    let result = seed_deck::run(None, vec!["  ".to_string()]);

    assert_eq!(result.exit_code, 6);
    assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
}

#[test]
fn handle_event_ignores_non_command_text() {
    with_env(&[("DECKBOT_DATABASE_URL", "sqlite::memory:")], || {
        let event = serde_json::json!({
            "detail-type": "line-message",
            "source": "chatbot",
            "detail": {
                "channelAccessToken": "tok",
                "eventType": "message",
                "externalMemberID": "U1",
                "replyToken": "r-1",
                "eventContent": {"type": "message", "message": {"type": "text", "text": "hello"}}
            }
        });

        let result = handle_event::run_with_input(event.to_string().as_bytes());
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        assert!(parse_payload(&result.output)["message"]
            .as_str()
            .unwrap_or_default()
            .starts_with("ignored"));
    });
}

#[test]
fn handle_event_rejects_malformed_input() {
    with_env(&[("DECKBOT_DATABASE_URL", "sqlite::memory:")], || {
        let result = handle_event::run_with_input(b"{not json");
        assert_eq!(result.exit_code, 6);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn config_redacts_bus_api_key_and_attributes_env_source() {
    with_env(
        &[
            ("DECKBOT_DATABASE_URL", "sqlite::memory:"),
            ("DECKBOT_BUS_ENDPOINT", "http://127.0.0.1:9000/events"),
            ("DECKBOT_BUS_API_KEY", "super-secret-key"),
        ],
        || {
            let output = config::run();
            assert!(!output.contains("super-secret-key"));
            assert!(output.contains("- bus.api_key = <redacted> (source: env (DECKBOT_BUS_API_KEY))"));
            assert!(output.contains("- slides.channel_id = 1 (source: default)"));
            assert!(output.contains("- line.api_base_url = https://api.line.me (source: default)"));
            assert!(!output.contains("line.timeout_secs"));
        },
    );
}

fn file_database_url(dir: &TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("deckbot.db").display())
}

fn register_channel(url: &str) -> ChannelId {
    block_on(async {
        let pool = connect_with_settings(url, 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let channel = SqlChannelRepository::new(pool.clone())
            .insert(NewChannel {
                name: "Deck Bot".to_string(),
                external_channel_id: "1650000000".to_string(),
                external_channel_secret: SecretString::from("secret".to_string()),
                access_token: SecretString::from("token".to_string()),
                access_token_expired_at: Utc::now() + Duration::days(30),
            })
            .await
            .expect("insert channel");
        pool.close().await;
        channel.id
    })
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(future)
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "DECKBOT_DATABASE_URL",
        "DECKBOT_DATABASE_MAX_CONNECTIONS",
        "DECKBOT_DATABASE_TIMEOUT_SECS",
        "DECKBOT_SERVER_BIND_ADDRESS",
        "DECKBOT_SERVER_PORT",
        "DECKBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "DECKBOT_LINE_API_BASE_URL",
        "DECKBOT_BUS_ENDPOINT",
        "DECKBOT_BUS_NAME",
        "DECKBOT_BUS_API_KEY",
        "DECKBOT_BUS_TIMEOUT_SECS",
        "DECKBOT_WEBHOOK_MODE",
        "DECKBOT_WEBHOOK_SLIDE_COMMAND",
        "DECKBOT_SLIDES_CHANNEL_ID",
        "DECKBOT_LOGGING_LEVEL",
        "DECKBOT_LOGGING_FORMAT",
        "DECKBOT_LOG_LEVEL",
        "DECKBOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
