use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use deckbot_core::channels::{ChannelLookup, ChannelStore};
use deckbot_core::domain::channel::{Channel, ChannelId, IssuedAccessToken, NewChannel};
use deckbot_core::errors::ServiceError;
use deckbot_core::slides::{EnabledSlideLookup, SlidePageStore};

use super::RepositoryError;

#[derive(Default)]
pub struct InMemoryChannelRepository {
    channels: RwLock<HashMap<i64, Channel>>,
}

impl InMemoryChannelRepository {
    async fn find(&self, id: ChannelId) -> Result<Channel, ServiceError> {
        let channels = self.channels.read().await;
        channels.get(&id.0).cloned().ok_or_else(|| RepositoryError::NotFound("channel").into())
    }
}

#[async_trait]
impl ChannelLookup for InMemoryChannelRepository {
    async fn get_by_external_id(
        &self,
        external_channel_id: &str,
    ) -> Result<Channel, ServiceError> {
        let channels = self.channels.read().await;
        channels
            .values()
            .find(|channel| channel.external_channel_id == external_channel_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound("channel").into())
    }

    async fn get_by_id(&self, id: ChannelId) -> Result<Channel, ServiceError> {
        self.find(id).await
    }
}

#[async_trait]
impl ChannelStore for InMemoryChannelRepository {
    async fn create(&self, channel: NewChannel) -> Result<Channel, ServiceError> {
        let mut channels = self.channels.write().await;
        if channels.values().any(|c| c.external_channel_id == channel.external_channel_id) {
            return Err(RepositoryError::Conflict(format!(
                "channel `{}` is already registered",
                channel.external_channel_id
            ))
            .into());
        }

        let id = channels.keys().max().copied().unwrap_or(0) + 1;
        let now = Utc::now();
        let created = Channel {
            id: ChannelId(id),
            name: channel.name,
            external_channel_id: channel.external_channel_id,
            external_channel_secret: channel.external_channel_secret,
            access_token: channel.access_token,
            access_token_expired_at: channel.access_token_expired_at,
            created_at: now,
            updated_at: now,
        };
        channels.insert(id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: ChannelId) -> Result<Channel, ServiceError> {
        self.find(id).await
    }

    async fn update_access_token(
        &self,
        id: ChannelId,
        token: &IssuedAccessToken,
    ) -> Result<Channel, ServiceError> {
        let mut channels = self.channels.write().await;
        let channel = channels.get_mut(&id.0).ok_or(RepositoryError::NotFound("channel"))?;
        channel.access_token = token.token.clone();
        channel.access_token_expired_at = token.expires_at;
        channel.updated_at = Utc::now();
        Ok(channel.clone())
    }
}

#[derive(Default)]
struct Deck {
    pages: BTreeMap<u32, String>,
    current: Option<u32>,
}

/// Slide store keeping each deck's current page as a single field, so two current pages can
/// never coexist.
#[derive(Default)]
pub struct InMemorySlideRepository {
    decks: RwLock<HashMap<i64, Deck>>,
}

impl InMemorySlideRepository {
    pub async fn replace_pages(&self, channel_id: ChannelId, urls: &[String]) {
        let pages = urls.iter().enumerate().map(|(index, url)| (index as u32 + 1, url.clone()));
        let deck = Deck { pages: pages.collect(), current: (!urls.is_empty()).then_some(1) };
        self.decks.write().await.insert(channel_id.0, deck);
    }

    pub async fn current_page(&self, channel_id: ChannelId) -> Option<u32> {
        self.decks.read().await.get(&channel_id.0).and_then(|deck| deck.current)
    }
}

#[async_trait]
impl SlidePageStore for InMemorySlideRepository {
    async fn get_last_page_number(&self, channel_id: ChannelId) -> Result<u32, ServiceError> {
        let decks = self.decks.read().await;
        decks
            .get(&channel_id.0)
            .and_then(|deck| deck.pages.keys().next_back().copied())
            .ok_or_else(|| RepositoryError::NotFound("slide").into())
    }

    async fn get_slide_url_by_page(
        &self,
        channel_id: ChannelId,
        page: u32,
    ) -> Result<(String, u32), ServiceError> {
        let decks = self.decks.read().await;
        decks
            .get(&channel_id.0)
            .and_then(|deck| deck.pages.get(&page))
            .map(|url| (url.clone(), page))
            .ok_or_else(|| RepositoryError::NotFound("slide").into())
    }

    async fn update_current_page(
        &self,
        channel_id: ChannelId,
        page: u32,
    ) -> Result<(), ServiceError> {
        let mut decks = self.decks.write().await;
        let deck = decks
            .get_mut(&channel_id.0)
            .filter(|deck| deck.pages.contains_key(&page))
            .ok_or(RepositoryError::NotFound("slide"))?;
        deck.current = Some(page);
        Ok(())
    }
}

#[async_trait]
impl EnabledSlideLookup for InMemorySlideRepository {
    async fn get_enabled_slide_url(&self, channel_id: ChannelId) -> Result<String, ServiceError> {
        let decks = self.decks.read().await;
        decks
            .get(&channel_id.0)
            .and_then(|deck| deck.current.and_then(|page| deck.pages.get(&page)))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound("slide").into())
    }
}
