use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use deckbot_core::channels::ChannelProvisioning;
use deckbot_core::domain::channel::{BotInfo, IssuedAccessToken};
use deckbot_core::errors::ServiceError;

use crate::dispatch::MessagingTransport;
use crate::messages::OutboundMessage;

pub const DEFAULT_API_BASE_URL: &str = "https://api.line.me";
pub const USER_AGENT: &str = "deckbot/1";
/// Per-request timeout for every platform call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const RETRY_KEY_HEADER: &str = "X-Line-Retry-Key";

#[derive(Debug, thiserror::Error)]
#[error("LINE API {operation} returned {status}: {body}")]
pub struct LineApiError {
    pub operation: &'static str,
    pub status: u16,
    pub body: String,
}

/// Messaging API client covering replies, pushes, token issue and bot info.
#[derive(Clone)]
pub struct LineClient {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyBody<'a> {
    reply_token: &'a str,
    messages: &'a [OutboundMessage],
}

#[derive(Serialize)]
struct PushBody<'a> {
    to: &'a str,
    messages: &'a [OutboundMessage],
}

#[derive(Deserialize)]
struct IssueTokenResponse {
    access_token: String,
    expires_in: i64,
}

impl LineClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| ServiceError::internal("", error))?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, ServiceError> {
        let response = request
            .send()
            .await
            .map_err(|err| ServiceError::external("", err.status().map(|s| s.as_u16()), err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(
            event_name = "line.api.failed",
            service = "line",
            operation,
            status_code = status.as_u16(),
            "LINE API call failed"
        );
        Err(ServiceError::external(
            "",
            Some(status.as_u16()),
            LineApiError { operation, status: status.as_u16(), body },
        ))
    }
}

#[async_trait]
impl MessagingTransport for LineClient {
    #[instrument(skip_all, fields(service = "line"))]
    async fn reply(
        &self,
        access_token: &SecretString,
        reply_token: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), ServiceError> {
        let request = self
            .http
            .post(self.url("/v2/bot/message/reply"))
            .bearer_auth(access_token.expose_secret())
            .json(&ReplyBody { reply_token, messages });
        self.send("reply", request).await.map(|_| ())
    }

    #[instrument(skip_all, fields(service = "line"))]
    async fn push(
        &self,
        access_token: &SecretString,
        to: &str,
        messages: &[OutboundMessage],
        retry_key: Option<&str>,
    ) -> Result<(), ServiceError> {
        let mut request = self
            .http
            .post(self.url("/v2/bot/message/push"))
            .bearer_auth(access_token.expose_secret())
            .json(&PushBody { to, messages });
        if let Some(retry_key) = retry_key {
            request = request.header(RETRY_KEY_HEADER, retry_key);
        }
        self.send("push", request).await.map(|_| ())
    }
}

#[async_trait]
impl ChannelProvisioning for LineClient {
    async fn issue_access_token(
        &self,
        external_channel_id: &str,
        external_channel_secret: &SecretString,
    ) -> Result<IssuedAccessToken, ServiceError> {
        let request = self.http.post(self.url("/v2/oauth/accessToken")).form(&[
            ("grant_type", "client_credentials"),
            ("client_id", external_channel_id),
            ("client_secret", external_channel_secret.expose_secret()),
        ]);
        let response = self.send("issue_access_token", request).await?;
        let issued: IssueTokenResponse =
            response.json().await.map_err(|error| ServiceError::external("", None, error))?;

        let expires_at = TimeDelta::try_seconds(issued.expires_in)
            .filter(|ttl| *ttl >= TimeDelta::zero())
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| ServiceError::external("", None, "invalid expires_in"))?;

        Ok(IssuedAccessToken { token: SecretString::from(issued.access_token), expires_at })
    }

    async fn get_bot_info(&self, access_token: &SecretString) -> Result<BotInfo, ServiceError> {
        let request =
            self.http.get(self.url("/v2/bot/info")).bearer_auth(access_token.expose_secret());
        let response = self.send("bot_info", request).await?;
        response.json().await.map_err(|error| ServiceError::external("", None, error))
    }
}
