use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{error, info};

use crate::domain::channel::{BotInfo, Channel, ChannelId, IssuedAccessToken, NewChannel};
use crate::errors::{ErrorKind, ServiceError};

/// Read side of channel storage, used by anything that authenticates against a tenant.
#[async_trait]
pub trait ChannelLookup: Send + Sync {
    async fn get_by_external_id(&self, external_channel_id: &str)
        -> Result<Channel, ServiceError>;
    async fn get_by_id(&self, id: ChannelId) -> Result<Channel, ServiceError>;
}

/// Write side of channel storage, used by registration and token refresh.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn create(&self, channel: NewChannel) -> Result<Channel, ServiceError>;
    async fn get_by_id(&self, id: ChannelId) -> Result<Channel, ServiceError>;
    async fn update_access_token(
        &self,
        id: ChannelId,
        token: &IssuedAccessToken,
    ) -> Result<Channel, ServiceError>;
}

/// Platform calls needed before a channel can be persisted.
#[async_trait]
pub trait ChannelProvisioning: Send + Sync {
    async fn issue_access_token(
        &self,
        external_channel_id: &str,
        external_channel_secret: &SecretString,
    ) -> Result<IssuedAccessToken, ServiceError>;
    async fn get_bot_info(&self, access_token: &SecretString) -> Result<BotInfo, ServiceError>;
}

pub struct ChannelService {
    store: Arc<dyn ChannelStore>,
    provisioning: Arc<dyn ChannelProvisioning>,
}

impl ChannelService {
    pub fn new(store: Arc<dyn ChannelStore>, provisioning: Arc<dyn ChannelProvisioning>) -> Self {
        Self { store, provisioning }
    }

    pub async fn create_channel(
        &self,
        external_channel_id: &str,
        external_channel_secret: SecretString,
    ) -> Result<Channel, ServiceError> {
        if external_channel_id.trim().is_empty() {
            return Err(ServiceError::message(
                ErrorKind::Parameter,
                "externalChannelID must not be empty",
            ));
        }

        let token = self
            .provisioning
            .issue_access_token(external_channel_id, &external_channel_secret)
            .await
            .inspect_err(|err| {
                error!(
                    event_name = "channel.create.issue_token_failed",
                    service = "channel",
                    external_channel_id,
                    error = %err,
                    "failed to issue access token from LINE"
                );
            })?;

        let info = self.provisioning.get_bot_info(&token.token).await.inspect_err(|err| {
            error!(
                event_name = "channel.create.bot_info_failed",
                service = "channel",
                external_channel_id,
                error = %err,
                "failed to get channel info"
            );
        })?;

        let channel = self
            .store
            .create(NewChannel {
                name: info.display_name,
                external_channel_id: external_channel_id.to_string(),
                external_channel_secret,
                access_token: token.token,
                access_token_expired_at: token.expires_at,
            })
            .await
            .inspect_err(|err| {
                error!(
                    event_name = "channel.create.persist_failed",
                    service = "channel",
                    external_channel_id,
                    error = %err,
                    "failed to create channel"
                );
            })?;

        info!(
            event_name = "channel.create.completed",
            service = "channel",
            channel_id = %channel.id,
            external_channel_id,
            "channel registered"
        );
        Ok(channel)
    }

    /// Issue a fresh access token for an existing channel and persist it with its expiry.
    pub async fn refresh_access_token(&self, id: ChannelId) -> Result<Channel, ServiceError> {
        let channel = self.store.get_by_id(id).await?;
        let token = self
            .provisioning
            .issue_access_token(&channel.external_channel_id, &channel.external_channel_secret)
            .await
            .inspect_err(|err| {
                error!(
                    event_name = "channel.refresh.issue_token_failed",
                    service = "channel",
                    channel_id = %id,
                    error = %err,
                    "failed to refresh access token"
                );
            })?;

        let updated = self.store.update_access_token(id, &token).await?;
        info!(
            event_name = "channel.refresh.completed",
            service = "channel",
            channel_id = %id,
            expires_at = %updated.access_token_expired_at.to_rfc3339(),
            "access token refreshed"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use secrecy::{ExposeSecret, SecretString};

    use super::{ChannelProvisioning, ChannelService, ChannelStore};
    use crate::domain::channel::{BotInfo, Channel, ChannelId, IssuedAccessToken, NewChannel};
    use crate::errors::{ErrorKind, ServiceError};

    #[derive(Default)]
    struct RecordingStore {
        channels: Mutex<Vec<Channel>>,
    }

    #[async_trait]
    impl ChannelStore for RecordingStore {
        async fn create(&self, channel: NewChannel) -> Result<Channel, ServiceError> {
            let mut channels = self.channels.lock().map_err(|_| {
                ServiceError::message(ErrorKind::Internal, "store lock poisoned")
            })?;
            let now = Utc::now();
            let created = Channel {
                id: ChannelId(channels.len() as i64 + 1),
                name: channel.name,
                external_channel_id: channel.external_channel_id,
                external_channel_secret: channel.external_channel_secret,
                access_token: channel.access_token,
                access_token_expired_at: channel.access_token_expired_at,
                created_at: now,
                updated_at: now,
            };
            channels.push(created.clone());
            Ok(created)
        }

        async fn get_by_id(&self, id: ChannelId) -> Result<Channel, ServiceError> {
            let channels = self.channels.lock().map_err(|_| {
                ServiceError::message(ErrorKind::Internal, "store lock poisoned")
            })?;
            channels
                .iter()
                .find(|channel| channel.id == id)
                .cloned()
                .ok_or_else(|| ServiceError::message(ErrorKind::ResourceNotFound, "not found"))
        }

        async fn update_access_token(
            &self,
            id: ChannelId,
            token: &IssuedAccessToken,
        ) -> Result<Channel, ServiceError> {
            let mut channels = self.channels.lock().map_err(|_| {
                ServiceError::message(ErrorKind::Internal, "store lock poisoned")
            })?;
            let channel = channels
                .iter_mut()
                .find(|channel| channel.id == id)
                .ok_or_else(|| ServiceError::message(ErrorKind::ResourceNotFound, "not found"))?;
            channel.access_token = token.token.clone();
            channel.access_token_expired_at = token.expires_at;
            Ok(channel.clone())
        }
    }

    struct FakeProvisioning {
        token: &'static str,
        fail_issue_with: Option<u16>,
    }

    #[async_trait]
    impl ChannelProvisioning for FakeProvisioning {
        async fn issue_access_token(
            &self,
            _external_channel_id: &str,
            _external_channel_secret: &SecretString,
        ) -> Result<IssuedAccessToken, ServiceError> {
            if let Some(status) = self.fail_issue_with {
                return Err(ServiceError::external("", Some(status), "issue token rejected"));
            }
            Ok(IssuedAccessToken {
                token: SecretString::from(self.token.to_string()),
                expires_at: Utc::now() + Duration::days(30),
            })
        }

        async fn get_bot_info(&self, _access_token: &SecretString) -> Result<BotInfo, ServiceError> {
            Ok(BotInfo {
                user_id: "Ubot".to_string(),
                basic_id: "@deck".to_string(),
                display_name: "Deck Bot".to_string(),
                picture_url: None,
            })
        }
    }

    fn service(store: Arc<RecordingStore>, provisioning: FakeProvisioning) -> ChannelService {
        ChannelService::new(store, Arc::new(provisioning))
    }

    #[tokio::test]
    async fn create_channel_uses_bot_display_name_and_issued_token() {
        let store = Arc::new(RecordingStore::default());
        let service =
            service(store.clone(), FakeProvisioning { token: "token-1", fail_issue_with: None });

        let channel = service
            .create_channel("1650000000", SecretString::from("secret".to_string()))
            .await
            .expect("create channel");

        assert_eq!(channel.name, "Deck Bot");
        assert_eq!(channel.external_channel_id, "1650000000");
        assert_eq!(channel.access_token.expose_secret(), "token-1");
        assert!(channel.access_token_expired_at > Utc::now());
    }

    #[tokio::test]
    async fn create_channel_surfaces_platform_status_and_persists_nothing() {
        let store = Arc::new(RecordingStore::default());
        let service =
            service(store.clone(), FakeProvisioning { token: "unused", fail_issue_with: Some(401) });

        let error = service
            .create_channel("1650000000", SecretString::from("bad".to_string()))
            .await
            .expect_err("issue token should fail");

        assert!(error.is(ErrorKind::External));
        assert_eq!(error.status_code(), 401);
        assert!(store.channels.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn create_channel_rejects_blank_external_id() {
        let store = Arc::new(RecordingStore::default());
        let service = service(store, FakeProvisioning { token: "t", fail_issue_with: None });

        let error = service
            .create_channel("  ", SecretString::from("secret".to_string()))
            .await
            .expect_err("blank id");

        assert!(error.is(ErrorKind::Parameter));
    }

    #[tokio::test]
    async fn refresh_access_token_replaces_stored_token() {
        let store = Arc::new(RecordingStore::default());
        let first =
            service(store.clone(), FakeProvisioning { token: "old-token", fail_issue_with: None });
        let channel = first
            .create_channel("1650000000", SecretString::from("secret".to_string()))
            .await
            .expect("create");

        let second =
            service(store.clone(), FakeProvisioning { token: "new-token", fail_issue_with: None });
        let refreshed = second.refresh_access_token(channel.id).await.expect("refresh");

        assert_eq!(refreshed.access_token.expose_secret(), "new-token");
        let stored = store.get_by_id(channel.id).await.expect("stored");
        assert_eq!(stored.access_token.expose_secret(), "new-token");
    }

    #[tokio::test]
    async fn refresh_access_token_for_unknown_channel_is_not_found() {
        let store = Arc::new(RecordingStore::default());
        let service = service(store, FakeProvisioning { token: "t", fail_issue_with: None });

        let error = service.refresh_access_token(ChannelId(99)).await.expect_err("missing");
        assert!(error.is(ErrorKind::ResourceNotFound));
    }
}
