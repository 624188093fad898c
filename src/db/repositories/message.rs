use anyhow::{Context, Result};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};

use crate::entities::messages;
use crate::models::SystemMessage;

pub struct MessageRepository {
    conn: DatabaseConnection,
}

impl MessageRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// All messages, oldest first, matching the cache order.
    pub async fn load_all(&self) -> Result<Vec<SystemMessage>> {
        let rows = messages::Entity::find()
            .order_by_asc(messages::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to load messages")?;

        Ok(rows.into_iter().map(SystemMessage::from).collect())
    }

    pub async fn insert(
        &self,
        recipient_id: i32,
        content: &str,
        created_at: &str,
    ) -> Result<SystemMessage> {
        let row = messages::ActiveModel {
            recipient_id: Set(recipient_id),
            content: Set(content.to_string()),
            created_at: Set(created_at.to_string()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert message")?;

        Ok(SystemMessage::from(row))
    }
}
