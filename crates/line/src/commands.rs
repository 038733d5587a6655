use std::sync::Arc;

use secrecy::SecretString;
use tracing::{info, warn};
use uuid::Uuid;

use deckbot_core::domain::channel::ChannelId;
use deckbot_core::errors::ServiceError;
use deckbot_core::slides::EnabledSlideLookup;

use crate::bus::{BusEvent, EVENT_DETAIL_TYPE};
use crate::dispatch::{MessageDispatcher, OutboundMessageRequest};
use crate::events::text_of;
use crate::messages::OutboundMessage;

/// Answers the slide command with an image of the deck's current page.
pub struct SlideCommandResponder {
    slides: Arc<dyn EnabledSlideLookup>,
    dispatcher: Arc<MessageDispatcher>,
    deck_channel: ChannelId,
    command: String,
}

impl SlideCommandResponder {
    pub fn new(
        slides: Arc<dyn EnabledSlideLookup>,
        dispatcher: Arc<MessageDispatcher>,
        deck_channel: ChannelId,
        command: impl Into<String>,
    ) -> Self {
        Self { slides, dispatcher, deck_channel, command: command.into() }
    }

    pub fn is_command(&self, text: Option<&str>) -> bool {
        text.is_some_and(|text| text == self.command)
    }

    pub async fn respond(
        &self,
        access_token: SecretString,
        reply_token: Option<String>,
        to: Option<String>,
    ) -> Result<(), ServiceError> {
        let url = self.slides.get_enabled_slide_url(self.deck_channel).await.inspect_err(|err| {
            warn!(
                event_name = "slide.command.lookup_failed",
                channel_id = %self.deck_channel,
                error = %err,
                "fail to get enabled slide URL"
            );
        })?;

        self.dispatcher
            .send(&OutboundMessageRequest {
                access_token,
                messages: vec![OutboundMessage::image(url)],
                reply_token,
                to,
                retry_key: Some(Uuid::new_v4().to_string()),
            })
            .await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerOutcome {
    Replied,
    Ignored,
}

/// Consumes `line-message` bus events and replies to the slide command.
pub struct SlideCommandWorker {
    responder: Arc<SlideCommandResponder>,
}

impl SlideCommandWorker {
    pub fn new(responder: Arc<SlideCommandResponder>) -> Self {
        Self { responder }
    }

    pub async fn handle(&self, raw: &[u8]) -> Result<WorkerOutcome, ServiceError> {
        let event: BusEvent = serde_json::from_slice(raw)
            .map_err(|error| ServiceError::parameter("invalid bus event", error))?;

        if event.detail_type != EVENT_DETAIL_TYPE {
            return Ok(WorkerOutcome::Ignored);
        }
        let text = text_of(event.detail.event_content.get());
        if !self.responder.is_command(text.as_deref()) {
            return Ok(WorkerOutcome::Ignored);
        }

        let detail = event.detail;
        self.responder
            .respond(
                SecretString::from(detail.channel_access_token),
                Some(detail.reply_token).filter(|token| !token.is_empty()),
                Some(detail.external_member_id).filter(|id| !id.is_empty()),
            )
            .await?;

        info!(
            event_name = "slide.command.replied",
            source = %event.source,
            "slide command answered from bus event"
        );
        Ok(WorkerOutcome::Replied)
    }
}
