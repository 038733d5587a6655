use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{sqlite::SqliteRow, Row};

use deckbot_core::channels::{ChannelLookup, ChannelStore};
use deckbot_core::domain::channel::{Channel, ChannelId, IssuedAccessToken, NewChannel};
use deckbot_core::errors::ServiceError;

use super::RepositoryError;
use crate::DbPool;

const CHANNEL_COLUMNS: &str = "id, name, external_channel_id, external_channel_secret, access_token,
                               access_token_expired_at, created_at, updated_at";

pub struct SqlChannelRepository {
    pool: DbPool,
}

impl SqlChannelRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: ChannelId) -> Result<Channel, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CHANNEL_COLUMNS} FROM channel WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => row_to_channel(row),
            None => Err(RepositoryError::NotFound("channel")),
        }
    }

    pub async fn find_by_external_id(
        &self,
        external_channel_id: &str,
    ) -> Result<Channel, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channel WHERE external_channel_id = ?"
        ))
        .bind(external_channel_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => row_to_channel(row),
            None => Err(RepositoryError::NotFound("channel")),
        }
    }

    pub async fn insert(&self, channel: NewChannel) -> Result<Channel, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO channel (name, external_channel_id, external_channel_secret, access_token,
                                  access_token_expired_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&channel.name)
        .bind(&channel.external_channel_id)
        .bind(channel.external_channel_secret.expose_secret())
        .bind(channel.access_token.expose_secret())
        .bind(channel.access_token_expired_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            RepositoryError::from_write(
                error,
                &format!("channel `{}` is already registered", channel.external_channel_id),
            )
        })?;

        Ok(Channel {
            id: ChannelId(result.last_insert_rowid()),
            name: channel.name,
            external_channel_id: channel.external_channel_id,
            external_channel_secret: channel.external_channel_secret,
            access_token: channel.access_token,
            access_token_expired_at: channel.access_token_expired_at,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn set_access_token(
        &self,
        id: ChannelId,
        token: &IssuedAccessToken,
    ) -> Result<Channel, RepositoryError> {
        let result = sqlx::query(
            "UPDATE channel SET access_token = ?, access_token_expired_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(token.token.expose_secret())
        .bind(token.expires_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("channel"));
        }
        self.find_by_id(id).await
    }
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("channel.{column}: {e}")))
}

fn row_to_channel(row: &SqliteRow) -> Result<Channel, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: i64 = row.try_get("id").map_err(decode)?;
    let name: String = row.try_get("name").map_err(decode)?;
    let external_channel_id: String = row.try_get("external_channel_id").map_err(decode)?;
    let external_channel_secret: String =
        row.try_get("external_channel_secret").map_err(decode)?;
    let access_token: String = row.try_get("access_token").map_err(decode)?;
    let expired_at: String = row.try_get("access_token_expired_at").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    Ok(Channel {
        id: ChannelId(id),
        name,
        external_channel_id,
        external_channel_secret: SecretString::from(external_channel_secret),
        access_token: SecretString::from(access_token),
        access_token_expired_at: parse_timestamp("access_token_expired_at", &expired_at)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait]
impl ChannelLookup for SqlChannelRepository {
    async fn get_by_external_id(
        &self,
        external_channel_id: &str,
    ) -> Result<Channel, ServiceError> {
        Ok(self.find_by_external_id(external_channel_id).await?)
    }

    async fn get_by_id(&self, id: ChannelId) -> Result<Channel, ServiceError> {
        Ok(self.find_by_id(id).await?)
    }
}

#[async_trait]
impl ChannelStore for SqlChannelRepository {
    async fn create(&self, channel: NewChannel) -> Result<Channel, ServiceError> {
        Ok(self.insert(channel).await?)
    }

    async fn get_by_id(&self, id: ChannelId) -> Result<Channel, ServiceError> {
        Ok(self.find_by_id(id).await?)
    }

    async fn update_access_token(
        &self,
        id: ChannelId,
        token: &IssuedAccessToken,
    ) -> Result<Channel, ServiceError> {
        Ok(self.set_access_token(id, token).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use secrecy::{ExposeSecret, SecretString};

    use deckbot_core::channels::ChannelLookup;
    use deckbot_core::domain::channel::{ChannelId, IssuedAccessToken, NewChannel};
    use deckbot_core::errors::ErrorKind;

    use super::SqlChannelRepository;
    use crate::repositories::RepositoryError;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlChannelRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlChannelRepository::new(pool)
    }

    fn new_channel(external_id: &str) -> NewChannel {
        NewChannel {
            name: "Deck Bot".to_string(),
            external_channel_id: external_id.to_string(),
            external_channel_secret: SecretString::from("channel-secret".to_string()),
            access_token: SecretString::from("access-token".to_string()),
            access_token_expired_at: Utc::now() + Duration::days(30),
        }
    }

    #[tokio::test]
    async fn insert_then_lookup_by_external_id() {
        let repo = setup().await;
        let created = repo.insert(new_channel("1650000000")).await.expect("insert");

        let found = repo.get_by_external_id("1650000000").await.expect("lookup");

        assert_eq!(found.id, created.id);
        assert_eq!(found.name, "Deck Bot");
        assert_eq!(found.external_channel_secret.expose_secret(), "channel-secret");
        assert_eq!(
            found.access_token_expired_at.timestamp(),
            created.access_token_expired_at.timestamp()
        );
    }

    #[tokio::test]
    async fn unknown_external_id_is_resource_not_found() {
        let repo = setup().await;

        let error = repo.get_by_external_id("missing").await.expect_err("no channel");

        assert!(error.is(ErrorKind::ResourceNotFound));
        assert_eq!(error.status_code(), 404);
    }

    #[tokio::test]
    async fn duplicate_external_id_is_a_conflict() {
        let repo = setup().await;
        repo.insert(new_channel("1650000000")).await.expect("first insert");

        let error = repo.insert(new_channel("1650000000")).await.expect_err("duplicate");

        assert!(matches!(error, RepositoryError::Conflict(ref message) if message.contains("1650000000")));
    }

    #[tokio::test]
    async fn set_access_token_updates_token_and_expiry() {
        let repo = setup().await;
        let created = repo.insert(new_channel("1650000000")).await.expect("insert");
        let expires_at = Utc::now() + Duration::days(60);

        let updated = repo
            .set_access_token(
                created.id,
                &IssuedAccessToken {
                    token: SecretString::from("rotated".to_string()),
                    expires_at,
                },
            )
            .await
            .expect("update token");

        assert_eq!(updated.access_token.expose_secret(), "rotated");
        assert_eq!(updated.access_token_expired_at.timestamp(), expires_at.timestamp());
    }

    #[tokio::test]
    async fn set_access_token_for_missing_channel_is_not_found() {
        let repo = setup().await;

        let error = repo
            .set_access_token(
                ChannelId(42),
                &IssuedAccessToken {
                    token: SecretString::from("t".to_string()),
                    expires_at: Utc::now(),
                },
            )
            .await
            .expect_err("missing");

        assert!(matches!(error, RepositoryError::NotFound("channel")));
    }
}
