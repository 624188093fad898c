//! The repository service owning the entity caches and the storage handle.
//!
//! Every mutating operation follows the same shape: resolve and authorize,
//! enforce domain constraints, write to durable storage, then mirror the
//! committed row into the cache. Identifier generation and the cache
//! mutation happen under the same collection lock, so two concurrent
//! requests can neither mint the same discriminator nor lose an update.
//! If the storage write fails the cache is left untouched.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Result;
use chrono::Utc;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::cache::{Caches, remove, replace};
use crate::config::Config;
use crate::db::Store;
use crate::db::repositories::user::{hash_password, verify_password};
use crate::keygen;
use crate::models::{ShortUrl, StoredFile, SystemMessage, User};
use crate::notify::{Event, Notifier};
use crate::perms::{Action, SUPERUSER_ID, can_modify};
use crate::storage::ContentStore;

// Absolute http(s) URLs only; anything else is rejected before any write.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9$\-_.+!*'(),%&@:/?#=~\[\]]+$").expect("url pattern")
});

#[derive(Debug, Error)]
pub enum OpError {
    #[error("Invalid or missing credentials.")]
    Unauthenticated,

    #[error("{message}")]
    InvalidRequest {
        message: String,
        required_fields: Vec<&'static str>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Forbidden {
        message: String,
        needed_permission: Option<&'static str>,
    },

    #[error("{message}")]
    Conflict {
        message: String,
        link: Option<String>,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OpError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            required_fields: Vec::new(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
            needed_permission: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            link: None,
        }
    }
}

pub type OpResult<T> = Result<T, OpError>;

/// Values accepted by the account-edit operation. Absent fields keep the
/// stored value.
#[derive(Debug, Default)]
pub struct UserEdit {
    pub username: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub admin: Option<AdminChange>,
}

#[derive(Debug, Clone, Copy)]
pub enum AdminChange {
    Set(bool),
    Toggle,
}

/// Outcome of a file deletion, which is a soft delete when archiving is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDeletion {
    Archived,
    Removed,
}

pub struct Registry {
    store: Store,
    caches: Caches,
    content: ContentStore,
    notifier: Notifier,
    config: Config,
}

impl Registry {
    /// Build the registry at boot: seed the synthetic superuser, then load
    /// every table into its cache in query order.
    pub async fn load(
        store: Store,
        content: ContentStore,
        notifier: Notifier,
        config: Config,
    ) -> Result<Self> {
        let superuser = User {
            id: SUPERUSER_ID,
            username: config.superuser.username.clone(),
            password_hash: hash_password(&config.superuser.password)?,
            display_name: config.superuser.display_name.clone(),
            is_admin: true,
            api_token: config.superuser.api_token.clone(),
            created_at: Utc::now().to_rfc3339(),
        };

        let mut users = store.users().load_all().await?;
        users.insert(0, superuser);

        let files = store.files().load_all().await?;
        let urls = store.urls().load_all().await?;
        let messages = store.messages().load_all().await?;

        Ok(Self {
            store,
            caches: Caches::new(users, files, urls, messages),
            content,
            notifier,
            config,
        })
    }

    #[must_use]
    pub const fn caches(&self) -> &Caches {
        &self.caches
    }

    #[must_use]
    pub const fn content(&self) -> &ContentStore {
        &self.content
    }

    // ------------------------------------------------------------------
    // Actor resolution & authentication
    // ------------------------------------------------------------------

    /// Resolve a user from an API token (bearer header or auth cookie).
    /// The superuser sits at the front of the cache, so a reset of its
    /// token takes effect immediately.
    pub async fn user_by_token(&self, token: &str) -> Option<User> {
        self.caches
            .users
            .find_first(|u| u.api_token == token)
            .await
    }

    pub async fn user_by_id(&self, id: i32) -> Option<User> {
        self.caches.users.find_first(|u| u.id == id).await
    }

    /// Username + password login. The failure mode does not reveal whether
    /// the username or the password was wrong.
    pub async fn authenticate(&self, username: &str, password: &str) -> OpResult<User> {
        let user = self
            .caches
            .users
            .find_first(|u| u.username == username)
            .await
            .ok_or_else(|| OpError::NotFound("User not found.".to_string()))?;

        if !verify_password(password, &user.password_hash).await? {
            return Err(OpError::NotFound("User not found.".to_string()));
        }

        Ok(user)
    }

    /// Password check against a known user id (the `/api/check` operation).
    pub async fn check_password(&self, user_id: i32, password: &str) -> OpResult<()> {
        let user = self
            .user_by_id(user_id)
            .await
            .ok_or_else(|| OpError::invalid("Invalid or missing user ID."))?;

        if !verify_password(password, &user.password_hash).await? {
            return Err(OpError::forbidden("Incorrect password."));
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    pub async fn create_user(
        &self,
        actor: &User,
        username: &str,
        password: &str,
        display_name: &str,
        admin: bool,
    ) -> OpResult<User> {
        if !actor.is_admin {
            return Err(OpError::Forbidden {
                message: "You cannot create accounts.".to_string(),
                needed_permission: Some("admin"),
            });
        }

        if admin && !can_modify(actor, actor, Action::SetAdmin) {
            return Err(OpError::Forbidden {
                message: "Only the superuser can create admin accounts.".to_string(),
                needed_permission: Some("superuser"),
            });
        }

        let password_hash = hash_password(password)?;

        let mut users = self.caches.users.lock().await;

        if users.iter().any(|u| u.username == username) {
            return Err(OpError::conflict("That username is taken."));
        }

        let token = keygen::generate(
            self.config.generator.token,
            users.iter().map(|u| u.api_token.as_str()),
        );

        let created = self
            .store
            .users()
            .insert(
                username,
                &password_hash,
                display_name,
                admin,
                &token,
                &Utc::now().to_rfc3339(),
            )
            .await?;

        users.push(created.clone());
        drop(users);

        self.notifier.notify(
            Event::ForceUserCreate,
            fields([
                ("user", created.display_name.clone()),
                ("admin", actor.display_name.clone()),
            ]),
        );

        Ok(created)
    }

    pub async fn edit_user(&self, actor: &User, user_id: i32, edit: UserEdit) -> OpResult<User> {
        let new_password_hash = match &edit.password {
            Some(password) => Some(hash_password(password)?),
            None => None,
        };

        let mut users = self.caches.users.lock().await;

        // The victim is resolved under the lock; a replacement row built
        // from a pre-lock snapshot would revert a concurrent edit's fields.
        let victim = users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| OpError::NotFound("User not found.".to_string()))?;

        if !can_modify(actor, &victim, Action::EditUser) {
            return Err(OpError::forbidden("You cannot edit this user."));
        }

        let mut toggled_to = None;
        let new_admin = match edit.admin {
            None => victim.is_admin,
            Some(change) => {
                if !can_modify(actor, &victim, Action::SetAdmin) {
                    return Err(OpError::Forbidden {
                        message: "Only the superuser can change admin status.".to_string(),
                        needed_permission: Some("superuser"),
                    });
                }
                let value = match change {
                    AdminChange::Set(value) => value,
                    AdminChange::Toggle => !victim.is_admin,
                };
                if value != victim.is_admin {
                    toggled_to = Some(value);
                }
                value
            }
        };

        if let Some(new_username) = &edit.username
            && users
                .iter()
                .any(|u| u.username == *new_username && u.id != victim.id)
        {
            return Err(OpError::conflict("That username is taken."));
        }

        let updated = User {
            id: victim.id,
            username: edit.username.unwrap_or_else(|| victim.username.clone()),
            password_hash: new_password_hash.unwrap_or_else(|| victim.password_hash.clone()),
            display_name: edit
                .display_name
                .unwrap_or_else(|| victim.display_name.clone()),
            is_admin: new_admin,
            api_token: victim.api_token.clone(),
            created_at: victim.created_at.clone(),
        };

        // The superuser row is seeded from config and has no database row;
        // its edits live in the cache until the next boot.
        if victim.id != SUPERUSER_ID {
            self.store.users().update(&updated).await?;
        }
        replace(&mut users, |u| u.id == victim.id, updated.clone());
        drop(users);

        let event = match toggled_to {
            Some(true) => Event::AdminToggleOn,
            Some(false) => Event::AdminToggleOff,
            None if actor.id == victim.id => Event::UserEdit,
            None => Event::ForceUserEdit,
        };
        self.notifier.notify(
            event,
            fields([
                ("user", updated.display_name.clone()),
                ("admin", actor.display_name.clone()),
            ]),
        );

        if actor.id != victim.id {
            self.create_sys_msg("FORCE_USER_EDIT", victim.id, &HashMap::new())
                .await;
        }

        Ok(updated)
    }

    pub async fn reset_token(&self, actor: &User, user_id: i32) -> OpResult<String> {
        let mut users = self.caches.users.lock().await;

        let victim = users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| OpError::NotFound("User not found.".to_string()))?;

        if !can_modify(actor, &victim, Action::ResetToken) {
            return Err(OpError::forbidden("You cannot reset this user's token."));
        }

        let token = keygen::generate(
            self.config.generator.token,
            users.iter().map(|u| u.api_token.as_str()),
        );

        if victim.id != SUPERUSER_ID {
            self.store.users().update_token(victim.id, &token).await?;
        }

        let mut updated = victim.clone();
        updated.api_token = token.clone();
        replace(&mut users, |u| u.id == victim.id, updated);
        drop(users);

        let event = if actor.id == victim.id {
            Event::UserTokenReset
        } else {
            Event::ForceUserTokenReset
        };
        self.notifier.notify(
            event,
            fields([
                ("user", victim.display_name.clone()),
                ("admin", actor.display_name.clone()),
            ]),
        );

        if actor.id != victim.id {
            self.create_sys_msg("FORCE_USER_TOKEN_RESET", victim.id, &HashMap::new())
                .await;
        }

        Ok(token)
    }

    pub async fn delete_user(&self, actor: &User, user_id: i32) -> OpResult<()> {
        let victim = self
            .user_by_id(user_id)
            .await
            .ok_or_else(|| OpError::NotFound("User not found.".to_string()))?;

        if victim.id == SUPERUSER_ID || !can_modify(actor, &victim, Action::DeleteUser) {
            return Err(OpError::forbidden("You cannot delete this user."));
        }

        let mut users = self.caches.users.lock().await;
        self.store.users().delete(victim.id).await?;
        remove(&mut users, |u| u.id == victim.id);
        drop(users);

        self.notifier.notify(
            Event::ForceUserDelete,
            fields([
                ("user", victim.display_name.clone()),
                ("admin", actor.display_name.clone()),
            ]),
        );

        Ok(())
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Persist an upload: disk write, row insert, cache front-insert, all
    /// under the file-collection lock. Returns the stored record and its
    /// served type.
    pub async fn create_file(
        &self,
        actor: &User,
        filename: &str,
        bytes: &[u8],
    ) -> OpResult<(StoredFile, String)> {
        let file_type = self
            .config
            .filetype(filename)
            .ok_or_else(|| OpError::invalid("Invalid filetype."))?
            .to_string();

        let extension = crate::config::file_extension(filename)
            .ok_or_else(|| OpError::invalid("Invalid filetype."))?;

        let mut files = self.caches.files.lock().await;

        let key = loop {
            let candidate = format!(
                "{}.{extension}",
                keygen::generate(self.config.generator.file_key, [])
            );
            if !files.iter().any(|f| f.discriminator == candidate) {
                break candidate;
            }
        };

        self.content.write(&key, bytes).await.map_err(|e| {
            OpError::Internal(e.context("Failed to write upload to disk"))
        })?;

        let created = match self
            .store
            .files()
            .insert(actor.id, &key, &Utc::now().to_rfc3339())
            .await
        {
            Ok(created) => created,
            Err(e) => {
                // Row never committed; drop the orphaned disk file.
                if let Err(cleanup) = self.content.delete(&key).await {
                    warn!("Failed to remove orphaned upload {key}: {cleanup}");
                }
                return Err(OpError::Internal(e));
            }
        };

        files.insert(0, created.clone());
        drop(files);

        self.notifier.notify(
            Event::FileUpload,
            fields([
                ("user", actor.display_name.clone()),
                ("key", created.discriminator.clone()),
            ]),
        );

        Ok((created, file_type))
    }

    /// Look up a live (not archived) upload by its public key. Disk reads
    /// go through this record, never a raw request path, so a decoded
    /// traversal sequence cannot name anything outside the content dir.
    pub async fn live_file(&self, key: &str) -> Option<StoredFile> {
        self.caches
            .files
            .find_first(|f| f.discriminator == key && !f.deleted)
            .await
    }

    pub async fn delete_file(&self, actor: &User, key: &str) -> OpResult<FileDeletion> {
        let file = self
            .live_file(key)
            .await
            .ok_or_else(|| OpError::NotFound("File not found.".to_string()))?;

        self.authorize_over_owner(actor, file.owner_id, Action::DeleteFile)
            .await?;

        let forced = actor.id != file.owner_id;
        let archived = self.config.uploads.archive_enabled;

        let mut files = self.caches.files.lock().await;

        if archived {
            let deleted_at = Utc::now().to_rfc3339();
            self.store
                .files()
                .set_deleted(file.id, Some(&deleted_at))
                .await?;

            if let Err(e) = self.content.archive(key).await {
                warn!("Failed to move {key} to the archive: {e}");
            }

            let mut updated = file.clone();
            updated.deleted = true;
            updated.deleted_at = Some(deleted_at);
            replace(&mut files, |f| f.id == file.id, updated);
        } else {
            self.store.files().delete_by_key(key).await?;

            if let Err(e) = self.content.delete(key).await {
                warn!("Failed to remove {key} from disk: {e}");
            }

            remove(&mut files, |f| f.id == file.id);
        }
        drop(files);

        let event = if forced {
            Event::ForceFileDelete
        } else {
            Event::FileDelete
        };
        self.notifier.notify(
            event,
            fields([
                ("admin", actor.display_name.clone()),
                ("key", key.to_string()),
            ]),
        );

        if forced {
            let mut msg_fields = HashMap::new();
            msg_fields.insert("key".to_string(), key.to_string());
            self.create_sys_msg("FORCE_FILE_DELETE", file.owner_id, &msg_fields)
                .await;
        }

        Ok(if archived {
            FileDeletion::Archived
        } else {
            FileDeletion::Removed
        })
    }

    /// Bring an archived file back. Admin-only while the file sits in the
    /// archive awaiting the purge.
    pub async fn restore_file(&self, actor: &User, key: &str) -> OpResult<StoredFile> {
        let file = self
            .caches
            .files
            .find_first(|f| f.discriminator == key && f.deleted)
            .await
            .ok_or_else(|| OpError::NotFound("Archived file not found.".to_string()))?;

        self.authorize_over_owner(actor, file.owner_id, Action::RestoreFile)
            .await?;

        let mut files = self.caches.files.lock().await;

        self.store.files().set_deleted(file.id, None).await?;

        if let Err(e) = self.content.restore(key).await {
            warn!("Failed to move {key} out of the archive: {e}");
        }

        let mut updated = file.clone();
        updated.deleted = false;
        updated.deleted_at = None;
        replace(&mut files, |f| f.id == file.id, updated.clone());
        drop(files);

        self.notifier.notify(
            Event::FileRestore,
            fields([
                ("admin", actor.display_name.clone()),
                ("key", key.to_string()),
            ]),
        );

        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Short URLs
    // ------------------------------------------------------------------

    pub async fn shorten_url(
        &self,
        actor: &User,
        target: &str,
        custom_key: Option<&str>,
    ) -> OpResult<ShortUrl> {
        if !URL_PATTERN.is_match(target) {
            return Err(OpError::invalid("That URL is invalid."));
        }

        let mut urls = self.caches.urls.lock().await;

        if let Some(existing) = urls.iter().find(|u| u.url == target) {
            return Err(OpError::Conflict {
                message: "That URL has already been shortened.".to_string(),
                link: Some(existing.discriminator.clone()),
            });
        }

        let key = match custom_key {
            Some(custom)
                if !custom.is_empty()
                    && (actor.is_admin || !self.config.shortening.custom_keys_admin_only) =>
            {
                if urls.iter().any(|u| u.discriminator == custom) {
                    return Err(OpError::conflict("That key is taken."));
                }
                custom.to_string()
            }
            _ => {
                let taken: Vec<&str> = urls.iter().map(|u| u.discriminator.as_str()).collect();
                keygen::generate(self.config.generator.url_key, taken)
            }
        };

        let created = self
            .store
            .urls()
            .insert(actor.id, &key, target, &Utc::now().to_rfc3339())
            .await?;

        urls.insert(0, created.clone());
        drop(urls);

        self.notifier.notify(
            Event::UrlShorten,
            fields([
                ("user", actor.display_name.clone()),
                ("key", created.discriminator.clone()),
                ("url", target.to_string()),
            ]),
        );

        Ok(created)
    }

    pub async fn delete_url(&self, actor: &User, key: &str) -> OpResult<()> {
        let url = self
            .caches
            .urls
            .find_first(|u| u.discriminator == key)
            .await
            .ok_or_else(|| OpError::NotFound("URL not found.".to_string()))?;

        self.authorize_over_owner(actor, url.owner_id, Action::DeleteUrl)
            .await?;

        let mut urls = self.caches.urls.lock().await;
        self.store.urls().delete_by_key(key).await?;
        remove(&mut urls, |u| u.id == url.id);
        drop(urls);

        let event = if actor.id == url.owner_id {
            Event::UrlDelete
        } else {
            Event::ForceUrlDelete
        };
        self.notifier.notify(
            event,
            fields([
                ("admin", actor.display_name.clone()),
                ("key", key.to_string()),
            ]),
        );

        Ok(())
    }

    /// Look up a short URL's target for redirecting.
    pub async fn resolve_url(&self, key: &str) -> Option<ShortUrl> {
        self.caches
            .urls
            .find_first(|u| u.discriminator == key)
            .await
    }

    // ------------------------------------------------------------------
    // System messages
    // ------------------------------------------------------------------

    pub async fn messages_for(&self, user_id: i32) -> Vec<SystemMessage> {
        self.caches
            .messages
            .find_all(|m| m.recipient_id == user_id)
            .await
    }

    /// Deliver a templated system message. Best-effort: missing templates
    /// are skipped, storage failures only log.
    pub async fn create_sys_msg(
        &self,
        event: &str,
        recipient_id: i32,
        msg_fields: &HashMap<String, String>,
    ) {
        let Some(template) = self.config.messaging.events.get(event) else {
            return;
        };

        let content = format!(
            "{}{}{}",
            self.config.messaging.before,
            crate::notify::render(template, msg_fields),
            self.config.messaging.after
        );

        let mut messages = self.caches.messages.lock().await;
        match self
            .store
            .messages()
            .insert(recipient_id, &content, &Utc::now().to_rfc3339())
            .await
        {
            Ok(created) => messages.push(created),
            Err(e) => warn!("Failed to store system message: {e}"),
        }
    }

    // ------------------------------------------------------------------
    // Archive purge
    // ------------------------------------------------------------------

    /// Drop archived rows older than the retention window and their disk
    /// files. Invoked by the scheduler.
    pub async fn purge_archive(&self) -> Result<usize> {
        let cutoff = (Utc::now()
            - chrono::Duration::days(i64::from(self.config.uploads.archive_retention_days)))
        .to_rfc3339();

        let mut files = self.caches.files.lock().await;
        let keys = self.store.files().purge_archived_before(&cutoff).await?;
        files.retain(|f| !keys.contains(&f.discriminator));
        drop(files);

        self.content.purge_archived(&keys).await;

        Ok(keys.len())
    }

    // ------------------------------------------------------------------

    /// Authorization for actions on owned entities: the permission target is
    /// the owner's account. Entities orphaned by account deletion fall back
    /// to admin-only.
    async fn authorize_over_owner(
        &self,
        actor: &User,
        owner_id: i32,
        action: Action,
    ) -> OpResult<()> {
        let allowed = match self.user_by_id(owner_id).await {
            Some(owner) => can_modify(actor, &owner, action),
            None => actor.is_admin,
        };

        if allowed {
            Ok(())
        } else {
            Err(OpError::forbidden("You don't own this."))
        }
    }
}

fn fields<const N: usize>(pairs: [(&str, String); N]) -> HashMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
