//! Slide deck navigation on top of the per-channel page store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::domain::channel::ChannelId;
use crate::domain::slide::{PrevNext, SlideView};
use crate::errors::{ErrorKind, ServiceError};

/// Storage operations the slide service relies on.
#[async_trait]
pub trait SlidePageStore: Send + Sync {
    /// Highest page number stored for the channel.
    async fn get_last_page_number(&self, channel_id: ChannelId) -> Result<u32, ServiceError>;

    /// Exact `(channel, page)` lookup returning `(url, page)`.
    async fn get_slide_url_by_page(
        &self,
        channel_id: ChannelId,
        page: u32,
    ) -> Result<(String, u32), ServiceError>;

    /// Flag `page` as current and clear every other page of the channel, atomically.
    async fn update_current_page(&self, channel_id: ChannelId, page: u32)
        -> Result<(), ServiceError>;
}

/// The one read the chat command path needs: the page currently on screen.
#[async_trait]
pub trait EnabledSlideLookup: Send + Sync {
    async fn get_enabled_slide_url(&self, channel_id: ChannelId) -> Result<String, ServiceError>;
}

pub struct SlideService {
    store: Arc<dyn SlidePageStore>,
}

impl SlideService {
    pub fn new(store: Arc<dyn SlidePageStore>) -> Self {
        Self { store }
    }

    /// Returns the URL for `page`. A page past the end of the deck resets to page 1.
    pub async fn get_slide_url(
        &self,
        channel_id: ChannelId,
        page: u32,
    ) -> Result<(String, u32), ServiceError> {
        let page = validate_page(page)?;
        let last = self.last_page(channel_id).await?;
        let page = if page > last { 1 } else { page };

        self.store.get_slide_url_by_page(channel_id, page).await.inspect_err(|err| {
            error!(
                event_name = "slide.lookup.failed",
                service = "slide",
                channel_id = %channel_id,
                page,
                error = %err,
                "fail to get slide url"
            );
        })
    }

    pub async fn get_prev_next(
        &self,
        channel_id: ChannelId,
        page: u32,
    ) -> Result<PrevNext, ServiceError> {
        let page = validate_page(page)?;
        let last = self.last_page(channel_id).await?;
        Ok(PrevNext::around(page, last))
    }

    pub async fn update_current_page(
        &self,
        channel_id: ChannelId,
        page: u32,
    ) -> Result<(), ServiceError> {
        self.store.update_current_page(channel_id, page).await.inspect_err(|err| {
            error!(
                event_name = "slide.update_current.failed",
                service = "slide",
                channel_id = %channel_id,
                page,
                error = %err,
                "fail to update current page"
            );
        })
    }

    /// Resolve the requested page, compute its neighbours and persist it as the current page.
    pub async fn present(
        &self,
        channel_id: ChannelId,
        requested_page: u32,
    ) -> Result<SlideView, ServiceError> {
        let (url, page) = self.get_slide_url(channel_id, requested_page).await?;
        let PrevNext { prev, next } = self.get_prev_next(channel_id, page).await?;
        self.update_current_page(channel_id, page).await?;
        Ok(SlideView { url, page, prev, next })
    }

    /// Number of pages in the channel's deck. An empty deck counts as zero.
    pub async fn page_count(&self, channel_id: ChannelId) -> Result<u32, ServiceError> {
        match self.store.get_last_page_number(channel_id).await {
            Err(err) if err.is(ErrorKind::ResourceNotFound) => Ok(0),
            other => other,
        }
    }

    async fn last_page(&self, channel_id: ChannelId) -> Result<u32, ServiceError> {
        self.store.get_last_page_number(channel_id).await.inspect_err(|err| {
            error!(
                event_name = "slide.last_page.failed",
                service = "slide",
                channel_id = %channel_id,
                error = %err,
                "fail to get last page"
            );
        })
    }
}

fn validate_page(page: u32) -> Result<u32, ServiceError> {
    if page == 0 {
        return Err(ServiceError::message(ErrorKind::Parameter, "page must be 1 or greater"));
    }
    Ok(page)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::{SlidePageStore, SlideService};
    use crate::domain::channel::ChannelId;
    use crate::domain::slide::{PrevNext, SlideView};
    use crate::errors::{ErrorKind, ServiceError};

    struct FakeDeck {
        pages: BTreeMap<u32, String>,
        current: Mutex<Option<u32>>,
    }

    impl FakeDeck {
        fn with_pages(count: u32) -> Self {
            let pages = (1..=count).map(|page| (page, format!("https://cdn/slide-{page}.png")));
            Self { pages: pages.collect(), current: Mutex::new(None) }
        }

        fn current(&self) -> Option<u32> {
            *self.current.lock().expect("lock")
        }
    }

    #[async_trait]
    impl SlidePageStore for FakeDeck {
        async fn get_last_page_number(&self, _channel_id: ChannelId) -> Result<u32, ServiceError> {
            self.pages
                .keys()
                .next_back()
                .copied()
                .ok_or_else(|| ServiceError::message(ErrorKind::ResourceNotFound, "empty deck"))
        }

        async fn get_slide_url_by_page(
            &self,
            _channel_id: ChannelId,
            page: u32,
        ) -> Result<(String, u32), ServiceError> {
            self.pages
                .get(&page)
                .map(|url| (url.clone(), page))
                .ok_or_else(|| ServiceError::message(ErrorKind::ResourceNotFound, "no page"))
        }

        async fn update_current_page(
            &self,
            _channel_id: ChannelId,
            page: u32,
        ) -> Result<(), ServiceError> {
            *self.current.lock().expect("lock") = Some(page);
            Ok(())
        }
    }

    const DECK: ChannelId = ChannelId(1);

    #[tokio::test]
    async fn page_count_treats_empty_deck_as_zero() {
        let empty = SlideService::new(Arc::new(FakeDeck::with_pages(0)));
        let full = SlideService::new(Arc::new(FakeDeck::with_pages(3)));

        assert_eq!(empty.page_count(DECK).await.expect("count"), 0);
        assert_eq!(full.page_count(DECK).await.expect("count"), 3);
    }

    #[tokio::test]
    async fn out_of_range_page_resets_to_first() {
        let service = SlideService::new(Arc::new(FakeDeck::with_pages(5)));

        let (url, page) = service.get_slide_url(DECK, 99).await.expect("url");

        assert_eq!(page, 1);
        assert_eq!(url, "https://cdn/slide-1.png");
    }

    #[tokio::test]
    async fn prev_next_wraps_at_both_ends() {
        let service = SlideService::new(Arc::new(FakeDeck::with_pages(5)));

        assert_eq!(
            service.get_prev_next(DECK, 1).await.expect("first"),
            PrevNext { prev: 5, next: 2 }
        );
        assert_eq!(
            service.get_prev_next(DECK, 5).await.expect("last"),
            PrevNext { prev: 4, next: 1 }
        );
    }

    #[tokio::test]
    async fn zero_page_is_a_parameter_error() {
        let service = SlideService::new(Arc::new(FakeDeck::with_pages(5)));

        let error = service.get_slide_url(DECK, 0).await.expect_err("page zero");
        assert!(error.is(ErrorKind::Parameter));
    }

    #[tokio::test]
    async fn present_persists_the_resolved_page() {
        let deck = Arc::new(FakeDeck::with_pages(3));
        let service = SlideService::new(deck.clone());

        let view = service.present(DECK, 7).await.expect("present");

        assert_eq!(
            view,
            SlideView { url: "https://cdn/slide-1.png".to_string(), page: 1, prev: 3, next: 2 }
        );
        assert_eq!(deck.current(), Some(1));
    }

    #[tokio::test]
    async fn empty_deck_propagates_not_found() {
        let service = SlideService::new(Arc::new(FakeDeck::with_pages(0)));

        let error = service.present(DECK, 1).await.expect_err("empty deck");
        assert!(error.is(ErrorKind::ResourceNotFound));
    }
}
