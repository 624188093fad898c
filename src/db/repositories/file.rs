use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::files;
use crate::models::StoredFile;

pub struct FileRepository {
    conn: DatabaseConnection,
}

impl FileRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Every stored file, newest first, matching the cache order.
    pub async fn load_all(&self) -> Result<Vec<StoredFile>> {
        let rows = files::Entity::find()
            .order_by_desc(files::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to load files")?;

        Ok(rows.into_iter().map(StoredFile::from).collect())
    }

    pub async fn insert(
        &self,
        owner_id: i32,
        discriminator: &str,
        created_at: &str,
    ) -> Result<StoredFile> {
        let row = files::ActiveModel {
            owner_id: Set(owner_id),
            discriminator: Set(discriminator.to_string()),
            created_at: Set(created_at.to_string()),
            deleted: Set(false),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert file")?;

        Ok(StoredFile::from(row))
    }

    /// Flip the soft-delete flag on an archived (or restored) file.
    /// Records the archive timestamp so the retention purge can age it.
    pub async fn set_deleted(&self, id: i32, deleted_at: Option<&str>) -> Result<()> {
        let existing = files::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query file for archive flag")?
            .ok_or_else(|| anyhow::anyhow!("File not found: {id}"))?;

        let mut active: files::ActiveModel = existing.into();
        active.deleted = Set(deleted_at.is_some());
        active.deleted_at = Set(deleted_at.map(ToString::to_string));
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn delete_by_key(&self, discriminator: &str) -> Result<()> {
        files::Entity::delete_many()
            .filter(files::Column::Discriminator.eq(discriminator))
            .exec(&self.conn)
            .await
            .context("Failed to delete file row")?;

        Ok(())
    }

    /// Hard-delete every row archived before the cutoff timestamp.
    /// Returns the keys that were removed so disk cleanup can follow.
    pub async fn purge_archived_before(&self, cutoff: &str) -> Result<Vec<String>> {
        let stale = files::Entity::find()
            .filter(files::Column::Deleted.eq(true))
            .filter(files::Column::DeletedAt.lt(cutoff))
            .all(&self.conn)
            .await
            .context("Failed to query stale archived files")?;

        let keys: Vec<String> = stale.iter().map(|f| f.discriminator.clone()).collect();

        files::Entity::delete_many()
            .filter(files::Column::Deleted.eq(true))
            .filter(files::Column::DeletedAt.lt(cutoff))
            .exec(&self.conn)
            .await
            .context("Failed to purge archived files")?;

        Ok(keys)
    }
}
