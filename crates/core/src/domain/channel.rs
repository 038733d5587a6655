use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub i64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tenant's chat-platform integration.
#[derive(Clone, Debug)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub external_channel_id: String,
    pub external_channel_secret: SecretString,
    pub access_token: SecretString,
    pub access_token_expired_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewChannel {
    pub name: String,
    pub external_channel_id: String,
    pub external_channel_secret: SecretString,
    pub access_token: SecretString,
    pub access_token_expired_at: DateTime<Utc>,
}

/// Short-lived channel access token issued by the platform.
#[derive(Clone, Debug)]
pub struct IssuedAccessToken {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotInfo {
    pub user_id: String,
    #[serde(default)]
    pub basic_id: String,
    pub display_name: String,
    #[serde(default)]
    pub picture_url: Option<String>,
}
