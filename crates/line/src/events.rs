use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use deckbot_core::errors::ServiceError;

/// One inbound webhook call, exactly as received.
#[derive(Clone, Debug)]
pub struct InboundWebhook {
    pub external_channel_id: String,
    pub signature: String,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineEventType {
    Message,
    Follow,
    Unfollow,
    /// Any other platform event type, preserved by name.
    Other(String),
}

impl LineEventType {
    pub fn parse(value: &str) -> Self {
        match value {
            "message" => Self::Message,
            "follow" => Self::Follow,
            "unfollow" => Self::Unfollow,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for LineEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LineEventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub kind: LineEventType,
    pub sender: Option<String>,
    pub reply_token: Option<String>,
    /// The event object exactly as it appeared in the webhook body.
    pub content: String,
}

impl NormalizedEvent {
    /// Text of a `message` event carrying a text message.
    pub fn text(&self) -> Option<String> {
        if self.kind != LineEventType::Message {
            return None;
        }
        text_of(&self.content)
    }
}

/// Extracts `message.text` from a raw event when `message.type` is `text`.
pub(crate) fn text_of(content: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Content {
        message: Option<Message>,
    }
    #[derive(Deserialize)]
    struct Message {
        #[serde(rename = "type")]
        kind: String,
        text: Option<String>,
    }

    let content: Content = serde_json::from_str(content).ok()?;
    content.message.filter(|message| message.kind == "text").and_then(|message| message.text)
}

#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(borrow, default)]
    events: Vec<&'a RawValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventHead {
    #[serde(rename = "type")]
    kind: String,
    reply_token: Option<String>,
    source: Option<Source>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Source {
    user_id: Option<String>,
}

/// Decode a webhook body into events, preserving source order. Any malformed event fails the
/// whole batch.
pub fn decode(payload: &[u8]) -> Result<Vec<NormalizedEvent>, ServiceError> {
    let envelope: Envelope<'_> = serde_json::from_slice(payload)
        .map_err(|error| ServiceError::parameter("invalid webhook payload", error))?;

    envelope
        .events
        .into_iter()
        .map(|raw| {
            let head: EventHead = serde_json::from_str(raw.get())
                .map_err(|error| ServiceError::parameter("invalid webhook event", error))?;
            Ok(NormalizedEvent {
                kind: LineEventType::parse(&head.kind),
                sender: head.source.and_then(|source| source.user_id),
                reply_token: head.reply_token.filter(|token| !token.is_empty()),
                content: raw.get().to_string(),
            })
        })
        .collect()
}
