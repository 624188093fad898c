use crate::entities::{files, messages, urls, users};

/// Account record mirrored between the users table and the cache.
/// The superuser (id 0) exists only in memory, seeded from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub is_admin: bool,
    pub api_token: String,
    pub created_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            password_hash: model.password_hash,
            display_name: model.display_name,
            is_admin: model.is_admin,
            api_token: model.api_token,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: i32,
    pub owner_id: i32,
    pub discriminator: String,
    pub created_at: String,
    pub deleted: bool,
    pub deleted_at: Option<String>,
}

impl From<files::Model> for StoredFile {
    fn from(model: files::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            discriminator: model.discriminator,
            created_at: model.created_at,
            deleted: model.deleted,
            deleted_at: model.deleted_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortUrl {
    pub id: i32,
    pub owner_id: i32,
    pub discriminator: String,
    pub url: String,
    pub created_at: String,
}

impl From<urls::Model> for ShortUrl {
    fn from(model: urls::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            discriminator: model.discriminator,
            url: model.url,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemMessage {
    pub id: i32,
    pub recipient_id: i32,
    pub content: String,
    pub created_at: String,
}

impl From<messages::Model> for SystemMessage {
    fn from(model: messages::Model) -> Self {
        Self {
            id: model.id,
            recipient_id: model.recipient_id,
            content: model.content,
            created_at: model.created_at,
        }
    }
}
