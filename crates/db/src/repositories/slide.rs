use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;

use deckbot_core::domain::channel::ChannelId;
use deckbot_core::domain::slide::SlidePage;
use deckbot_core::errors::ServiceError;
use deckbot_core::slides::{EnabledSlideLookup, SlidePageStore};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlSlideRepository {
    pool: DbPool,
}

impl SqlSlideRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn last_page_number(&self, channel_id: ChannelId) -> Result<u32, RepositoryError> {
        let row = sqlx::query("SELECT MAX(page) AS last_page FROM slide WHERE channel_id = ?")
            .bind(channel_id.0)
            .fetch_one(&self.pool)
            .await?;

        let last: Option<i64> =
            row.try_get("last_page").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        match last {
            Some(last) => page_from_column(last),
            None => Err(RepositoryError::NotFound("slide")),
        }
    }

    pub async fn url_by_page(
        &self,
        channel_id: ChannelId,
        page: u32,
    ) -> Result<(String, u32), RepositoryError> {
        let row = sqlx::query("SELECT url, page FROM slide WHERE channel_id = ? AND page = ?")
            .bind(channel_id.0)
            .bind(i64::from(page))
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(RepositoryError::NotFound("slide"));
        };
        let url: String = row.try_get("url").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let page: i64 = row.try_get("page").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        Ok((url, page_from_column(page)?))
    }

    pub async fn enabled_url(&self, channel_id: ChannelId) -> Result<String, RepositoryError> {
        let row = sqlx::query("SELECT url FROM slide WHERE channel_id = ? AND current = 1")
            .bind(channel_id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_get("url").map_err(|e| RepositoryError::Decode(e.to_string())),
            None => Err(RepositoryError::NotFound("slide")),
        }
    }

    /// Clears the current flag on every other page of the channel, then sets it on `page`.
    /// Rolls back when `page` does not exist, so a failed move keeps the previous current page.
    pub async fn set_current_page(
        &self,
        channel_id: ChannelId,
        page: u32,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE slide SET current = 0 WHERE channel_id = ? AND page <> ? AND current = 1")
            .bind(channel_id.0)
            .bind(i64::from(page))
            .execute(&mut *tx)
            .await?;

        let updated = sqlx::query("UPDATE slide SET current = 1 WHERE channel_id = ? AND page = ?")
            .bind(channel_id.0)
            .bind(i64::from(page))
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::NotFound("slide"));
        }

        tx.commit().await?;
        debug!(
            event_name = "slide.current_page.updated",
            channel_id = %channel_id,
            page,
            "current page moved"
        );
        Ok(())
    }

    /// Replace a channel's deck with `urls` as pages `1..=n`, page 1 current.
    pub async fn replace_pages(
        &self,
        channel_id: ChannelId,
        urls: &[String],
    ) -> Result<Vec<SlidePage>, RepositoryError> {
        if urls.is_empty() {
            return Err(RepositoryError::Conflict("a deck needs at least one page".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM slide WHERE channel_id = ?")
            .bind(channel_id.0)
            .execute(&mut *tx)
            .await?;

        let mut pages = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            let page = u32::try_from(index + 1)
                .map_err(|_| RepositoryError::Conflict("deck has too many pages".to_string()))?;
            let current = page == 1;
            sqlx::query("INSERT INTO slide (channel_id, url, page, current) VALUES (?, ?, ?, ?)")
                .bind(channel_id.0)
                .bind(url)
                .bind(i64::from(page))
                .bind(current)
                .execute(&mut *tx)
                .await
                .map_err(|error| {
                    RepositoryError::from_write(error, "slide page already exists")
                })?;
            pages.push(SlidePage { channel_id, page, url: url.clone(), current });
        }

        tx.commit().await?;
        Ok(pages)
    }

    pub async fn list_pages(&self, channel_id: ChannelId) -> Result<Vec<SlidePage>, RepositoryError> {
        let rows =
            sqlx::query("SELECT url, page, current FROM slide WHERE channel_id = ? ORDER BY page")
                .bind(channel_id.0)
                .fetch_all(&self.pool)
                .await?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
                let page: i64 = row.try_get("page").map_err(decode)?;
                Ok(SlidePage {
                    channel_id,
                    page: page_from_column(page)?,
                    url: row.try_get("url").map_err(decode)?,
                    current: row.try_get("current").map_err(decode)?,
                })
            })
            .collect()
    }
}

fn page_from_column(value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::Decode(format!("slide.page out of range: {value}")))
}

#[async_trait]
impl SlidePageStore for SqlSlideRepository {
    async fn get_last_page_number(&self, channel_id: ChannelId) -> Result<u32, ServiceError> {
        Ok(self.last_page_number(channel_id).await?)
    }

    async fn get_slide_url_by_page(
        &self,
        channel_id: ChannelId,
        page: u32,
    ) -> Result<(String, u32), ServiceError> {
        Ok(self.url_by_page(channel_id, page).await?)
    }

    async fn update_current_page(
        &self,
        channel_id: ChannelId,
        page: u32,
    ) -> Result<(), ServiceError> {
        Ok(self.set_current_page(channel_id, page).await?)
    }
}

#[async_trait]
impl EnabledSlideLookup for SqlSlideRepository {
    async fn get_enabled_slide_url(&self, channel_id: ChannelId) -> Result<String, ServiceError> {
        Ok(self.enabled_url(channel_id).await?)
    }
}
