use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::{debug, error, info, instrument, warn};

use deckbot_core::channels::ChannelLookup;
use deckbot_core::config::DeliveryMode;
use deckbot_core::domain::channel::Channel;
use deckbot_core::errors::{ErrorKind, ServiceError};

use crate::bus::{BusEventDetail, EventPublisher};
use crate::commands::SlideCommandResponder;
use crate::events::{decode, InboundWebhook, NormalizedEvent};
use crate::signature::SignatureVerifier;

/// Per-request tally of what happened to each decoded event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InboundOutcome {
    pub received: usize,
    pub published: usize,
    pub replied: usize,
    pub ignored: usize,
    pub failed: usize,
}

enum EventResult {
    Published,
    Replied,
    Ignored,
}

pub struct WebhookOrchestrator {
    channels: Arc<dyn ChannelLookup>,
    verifier: Arc<dyn SignatureVerifier>,
    publisher: Arc<dyn EventPublisher>,
    responder: Arc<SlideCommandResponder>,
    mode: DeliveryMode,
}

impl WebhookOrchestrator {
    pub fn new(
        channels: Arc<dyn ChannelLookup>,
        verifier: Arc<dyn SignatureVerifier>,
        publisher: Arc<dyn EventPublisher>,
        responder: Arc<SlideCommandResponder>,
        mode: DeliveryMode,
    ) -> Self {
        Self { channels, verifier, publisher, responder, mode }
    }

    /// Authenticate and process one webhook call. Fails closed: nothing is decoded or
    /// delivered unless the channel exists and the signature matches its secret.
    #[instrument(
        skip_all,
        fields(component = "webhook", external_channel_id = %webhook.external_channel_id)
    )]
    pub async fn handle_inbound(
        &self,
        webhook: &InboundWebhook,
    ) -> Result<InboundOutcome, ServiceError> {
        let channel =
            self.channels.get_by_external_id(&webhook.external_channel_id).await.inspect_err(
                |err| error!(event_name = "webhook.channel.lookup_failed", error = %err, "failed to get channel"),
            )?;

        let secret = channel.external_channel_secret.expose_secret();
        if !self.verifier.verify(secret, &webhook.signature, &webhook.payload) {
            warn!(event_name = "webhook.signature.invalid", "invalid webhook payload");
            return Err(ServiceError::message(ErrorKind::Parameter, "invalid webhook payload"));
        }

        let events = decode(&webhook.payload).inspect_err(|err| {
            error!(event_name = "webhook.decode.failed", error = %err, "failed to parse line webhook events");
        })?;

        let mut outcome = InboundOutcome { received: events.len(), ..InboundOutcome::default() };
        for event in &events {
            debug!(
                event_name = "webhook.event.received",
                event_type = %event.kind,
                external_member_id = event.sender.as_deref().unwrap_or_default(),
                "get line event"
            );
            match self.handle_event(&channel, event).await {
                Ok(EventResult::Published) => outcome.published += 1,
                Ok(EventResult::Replied) => outcome.replied += 1,
                Ok(EventResult::Ignored) => outcome.ignored += 1,
                Err(err) => {
                    outcome.failed += 1;
                    error!(
                        event_name = "webhook.event.failed",
                        event_type = %event.kind,
                        mode = self.mode.as_str(),
                        error = %err,
                        "failed to handle line event"
                    );
                }
            }
        }

        info!(
            event_name = "webhook.inbound.completed",
            channel_id = %channel.id,
            received = outcome.received,
            published = outcome.published,
            replied = outcome.replied,
            ignored = outcome.ignored,
            failed = outcome.failed,
            "webhook processed"
        );
        Ok(outcome)
    }

    async fn handle_event(
        &self,
        channel: &Channel,
        event: &NormalizedEvent,
    ) -> Result<EventResult, ServiceError> {
        match self.mode {
            DeliveryMode::Publish => {
                let detail = BusEventDetail::from_event(event, &channel.access_token)?;
                let detail = serde_json::to_string(&detail)?;
                self.publisher.publish(&detail).await?;
                Ok(EventResult::Published)
            }
            DeliveryMode::Reply => {
                if !self.responder.is_command(event.text().as_deref()) {
                    return Ok(EventResult::Ignored);
                }
                self.responder
                    .respond(
                        channel.access_token.clone(),
                        event.reply_token.clone(),
                        event.sender.clone(),
                    )
                    .await?;
                Ok(EventResult::Replied)
            }
        }
    }
}
