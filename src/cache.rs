//! In-memory mirror of the database tables.
//!
//! Each collection holds the full table, ordered the way its queries want it:
//! users ascending by id (superuser first), files and URLs newest-first,
//! messages oldest-first. Mutations go through the owning [`crate::registry::Registry`],
//! which writes to storage before touching the cache.

use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::models::{ShortUrl, StoredFile, SystemMessage, User};

pub struct EntityCache<T> {
    inner: RwLock<Vec<T>>,
}

impl<T: Clone> EntityCache<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            inner: RwLock::new(items),
        }
    }

    /// First element matching the predicate, cloned out.
    pub async fn find_first<P>(&self, pred: P) -> Option<T>
    where
        P: Fn(&T) -> bool,
    {
        self.inner.read().await.iter().find(|t| pred(t)).cloned()
    }

    /// All elements matching the predicate, in collection order.
    pub async fn find_all<P>(&self, pred: P) -> Vec<T>
    where
        P: Fn(&T) -> bool,
    {
        self.inner
            .read()
            .await
            .iter()
            .filter(|t| pred(t))
            .cloned()
            .collect()
    }

    pub async fn snapshot(&self) -> Vec<T> {
        self.inner.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Exclusive access for compound operations. Generation, storage write and
    /// cache mutation for one request all happen under this guard.
    pub async fn lock(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.inner.write().await
    }
}

/// Replace the first element matching the predicate, returning the new value.
/// The old record is dropped; callers always re-read through the cache.
pub fn replace<T: Clone, P>(items: &mut Vec<T>, pred: P, new: T) -> Option<T>
where
    P: Fn(&T) -> bool,
{
    let idx = items.iter().position(|t| pred(t))?;
    items[idx] = new.clone();
    Some(new)
}

/// Remove and return the first element matching the predicate.
pub fn remove<T, P>(items: &mut Vec<T>, pred: P) -> Option<T>
where
    P: Fn(&T) -> bool,
{
    let idx = items.iter().position(|t| pred(t))?;
    Some(items.remove(idx))
}

/// The four mirrored collections, loaded once at boot.
pub struct Caches {
    pub users: EntityCache<User>,
    pub files: EntityCache<StoredFile>,
    pub urls: EntityCache<ShortUrl>,
    pub messages: EntityCache<SystemMessage>,
}

impl Caches {
    #[must_use]
    pub fn new(
        users: Vec<User>,
        files: Vec<StoredFile>,
        urls: Vec<ShortUrl>,
        messages: Vec<SystemMessage>,
    ) -> Self {
        Self {
            users: EntityCache::new(users),
            files: EntityCache::new(files),
            urls: EntityCache::new(urls),
            messages: EntityCache::new(messages),
        }
    }
}
