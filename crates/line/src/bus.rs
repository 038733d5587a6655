use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::debug;

use deckbot_core::errors::ServiceError;

use crate::events::NormalizedEvent;

pub const EVENT_SOURCE: &str = "chatbot";
pub const EVENT_DETAIL_TYPE: &str = "line-message";

/// Best-effort sink for normalized events. Callers log failures and move on.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, detail: &str) -> Result<(), ServiceError>;
}

/// Detail payload of a `line-message` bus event.
#[derive(Debug, Serialize, Deserialize)]
pub struct BusEventDetail {
    #[serde(rename = "channelAccessToken")]
    pub channel_access_token: String,
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(rename = "externalMemberID", default)]
    pub external_member_id: String,
    #[serde(rename = "replyToken", default)]
    pub reply_token: String,
    #[serde(rename = "eventContent")]
    pub event_content: Box<RawValue>,
}

impl BusEventDetail {
    /// Enrich a decoded event with the channel's access token. Absent ids become empty strings.
    pub fn from_event(
        event: &NormalizedEvent,
        access_token: &SecretString,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            channel_access_token: access_token.expose_secret().to_string(),
            event_type: event.kind.as_str().to_string(),
            external_member_id: event.sender.clone().unwrap_or_default(),
            reply_token: event.reply_token.clone().unwrap_or_default(),
            event_content: RawValue::from_string(event.content.clone())?,
        })
    }
}

/// A bus event as delivered to consumers.
#[derive(Debug, Deserialize)]
pub struct BusEvent {
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    pub source: String,
    pub detail: BusEventDetail,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutEventsEntry<'a> {
    source: &'a str,
    detail_type: &'a str,
    detail: &'a str,
    event_bus_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutEventsRequest<'a> {
    entries: [PutEventsEntry<'a>; 1],
}

/// Publishes one `PutEvents`-shaped entry per call to an HTTP event bus endpoint.
pub struct HttpEventBus {
    http: Client,
    endpoint: String,
    bus_name: String,
    api_key: Option<SecretString>,
}

impl HttpEventBus {
    pub fn new(
        endpoint: impl Into<String>,
        bus_name: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(crate::client::USER_AGENT)
            .build()
            .map_err(|error| ServiceError::internal("", error))?;
        Ok(Self { http, endpoint: endpoint.into(), bus_name: bus_name.into(), api_key })
    }
}

#[async_trait]
impl EventPublisher for HttpEventBus {
    async fn publish(&self, detail: &str) -> Result<(), ServiceError> {
        let body = PutEventsRequest {
            entries: [PutEventsEntry {
                source: EVENT_SOURCE,
                detail_type: EVENT_DETAIL_TYPE,
                detail,
                event_bus_name: &self.bus_name,
            }],
        };

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|err| ServiceError::external("", err.status().map(|s| s.as_u16()), err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::external(
                "",
                Some(status.as_u16()),
                format!("event bus rejected entry with {status}"),
            ));
        }
        Ok(())
    }
}

/// Publisher used when no bus endpoint is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, detail: &str) -> Result<(), ServiceError> {
        debug!(event_name = "bus.publish.skipped", bytes = detail.len(), "no event bus configured");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use mockito::Matcher;
    use secrecy::SecretString;
    use serde_json::{json, Value};

    use deckbot_core::errors::{ErrorKind, ServiceError};

    use super::{BusEvent, BusEventDetail, EventPublisher, HttpEventBus};
    use crate::events::{LineEventType, NormalizedEvent};

    #[derive(Default)]
    pub struct RecordingPublisher {
        pub published: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingPublisher {
        pub fn published(&self) -> Vec<String> {
            self.published.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, detail: &str) -> Result<(), ServiceError> {
            self.published.lock().expect("lock").push(detail.to_string());
            if self.fail {
                return Err(ServiceError::external("", Some(503), "bus unavailable"));
            }
            Ok(())
        }
    }

    fn follow_event(reply_token: Option<&str>) -> NormalizedEvent {
        NormalizedEvent {
            kind: LineEventType::Follow,
            sender: Some("U1".to_string()),
            reply_token: reply_token.map(str::to_string),
            content: r#"{"type":"follow","source":{"userId":"U1"}}"#.to_string(),
        }
    }

    #[test]
    fn detail_embeds_event_content_as_json_not_string() {
        let detail =
            BusEventDetail::from_event(&follow_event(Some("r-1")), &SecretString::from("tok".to_string()))
                .expect("detail");

        let value: Value = serde_json::to_value(&detail).expect("json");
        assert_eq!(
            value,
            json!({
                "channelAccessToken": "tok",
                "eventType": "follow",
                "externalMemberID": "U1",
                "replyToken": "r-1",
                "eventContent": {"type": "follow", "source": {"userId": "U1"}}
            })
        );
    }

    #[test]
    fn missing_reply_token_serializes_as_empty_string() {
        let detail =
            BusEventDetail::from_event(&follow_event(None), &SecretString::from("tok".to_string()))
                .expect("detail");

        assert_eq!(detail.reply_token, "");
    }

    #[test]
    fn bus_event_decodes_consumer_envelope() {
        let raw = r#"{
            "detail-type": "line-message",
            "source": "chatbot",
            "detail": {
                "channelAccessToken": "tok",
                "eventType": "message",
                "externalMemberID": "U1",
                "replyToken": "r-1",
                "eventContent": {"type":"message","message":{"type":"text","text":"Download Slide"}}
            }
        }"#;

        let event: BusEvent = serde_json::from_str(raw).expect("decode");

        assert_eq!(event.detail_type, "line-message");
        assert_eq!(event.detail.external_member_id, "U1");
        assert!(event.detail.event_content.get().contains("Download Slide"));
    }

    fn http_bus(server: &mockito::Server, api_key: Option<&str>) -> HttpEventBus {
        HttpEventBus::new(
            format!("{}/events", server.url()),
            "deckbot-bus",
            api_key.map(|key| SecretString::from(key.to_string())),
            Duration::from_secs(5),
        )
        .expect("bus")
    }

    #[tokio::test]
    async fn http_bus_posts_put_events_entry_with_bearer_key() {
        let mut server = mockito::Server::new_async().await;
        let detail = r#"{"eventType":"follow"}"#;
        let mock = server
            .mock("POST", "/events")
            .match_header("authorization", "Bearer bus-key")
            .match_body(Matcher::Json(json!({
                "Entries": [{
                    "Source": "chatbot",
                    "DetailType": "line-message",
                    "Detail": detail,
                    "EventBusName": "deckbot-bus"
                }]
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        http_bus(&server, Some("bus-key")).publish(detail).await.expect("publish");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_bus_without_key_sends_no_authorization() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/events")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .create_async()
            .await;

        http_bus(&server, None).publish("{}").await.expect("publish");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_bus_rejection_is_external_with_upstream_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/events")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let error = http_bus(&server, None).publish("{}").await.expect_err("bus rejects");

        assert!(error.is(ErrorKind::External));
        assert_eq!(error.status_code(), 503);
        mock.assert_async().await;
    }
}
