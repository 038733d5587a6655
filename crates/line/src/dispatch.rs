use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{debug, warn};

use deckbot_core::errors::{ErrorKind, ServiceError};

use crate::messages::OutboundMessage;

/// The two delivery primitives of the messaging platform.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    async fn reply(
        &self,
        access_token: &SecretString,
        reply_token: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), ServiceError>;

    async fn push(
        &self,
        access_token: &SecretString,
        to: &str,
        messages: &[OutboundMessage],
        retry_key: Option<&str>,
    ) -> Result<(), ServiceError>;
}

#[derive(Clone, Debug)]
pub struct OutboundMessageRequest {
    pub access_token: SecretString,
    pub messages: Vec<OutboundMessage>,
    pub reply_token: Option<String>,
    /// User, group or room id for the push fallback.
    pub to: Option<String>,
    pub retry_key: Option<String>,
}

pub struct MessageDispatcher {
    transport: Arc<dyn MessagingTransport>,
}

impl MessageDispatcher {
    pub fn new(transport: Arc<dyn MessagingTransport>) -> Self {
        Self { transport }
    }

    /// Reply when a reply token is present, then fall back to a single push.
    pub async fn send(&self, request: &OutboundMessageRequest) -> Result<(), ServiceError> {
        let mut last_error = None;

        if let Some(reply_token) = non_blank(&request.reply_token) {
            match self.transport.reply(&request.access_token, reply_token, &request.messages).await
            {
                Ok(()) => {
                    debug!(event_name = "line.dispatch.replied", "message delivered by reply");
                    return Ok(());
                }
                Err(error) => {
                    warn!(
                        event_name = "line.dispatch.reply_failed",
                        error = %error,
                        fallback = request.to.is_some(),
                        "reply failed"
                    );
                    last_error = Some(error);
                }
            }
        }

        if let Some(to) = non_blank(&request.to) {
            let retry_key = non_blank(&request.retry_key);
            match self.transport.push(&request.access_token, to, &request.messages, retry_key).await
            {
                Ok(()) => {
                    debug!(event_name = "line.dispatch.pushed", "message delivered by push");
                    return Ok(());
                }
                Err(error) => {
                    warn!(event_name = "line.dispatch.push_failed", error = %error, "push failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ServiceError::message(
                ErrorKind::Parameter,
                "message request has neither a reply token nor a destination",
            )
        }))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}
