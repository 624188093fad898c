use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::urls;
use crate::models::ShortUrl;

pub struct UrlRepository {
    conn: DatabaseConnection,
}

impl UrlRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Every shortened URL, newest first, matching the cache order.
    pub async fn load_all(&self) -> Result<Vec<ShortUrl>> {
        let rows = urls::Entity::find()
            .order_by_desc(urls::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to load urls")?;

        Ok(rows.into_iter().map(ShortUrl::from).collect())
    }

    pub async fn insert(
        &self,
        owner_id: i32,
        discriminator: &str,
        url: &str,
        created_at: &str,
    ) -> Result<ShortUrl> {
        let row = urls::ActiveModel {
            owner_id: Set(owner_id),
            discriminator: Set(discriminator.to_string()),
            url: Set(url.to_string()),
            created_at: Set(created_at.to_string()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert url")?;

        Ok(ShortUrl::from(row))
    }

    pub async fn delete_by_key(&self, discriminator: &str) -> Result<()> {
        urls::Entity::delete_many()
            .filter(urls::Column::Discriminator.eq(discriminator))
            .exec(&self.conn)
            .await
            .context("Failed to delete url row")?;

        Ok(())
    }
}
