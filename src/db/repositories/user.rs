use anyhow::{Context, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tokio::task;

use crate::entities::users;
use crate::models::User;

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Every stored account, ascending by id. Used to fill the cache at boot.
    pub async fn load_all(&self) -> Result<Vec<User>> {
        let rows = users::Entity::find()
            .order_by_asc(users::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to load users")?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    pub async fn insert(
        &self,
        username: &str,
        password_hash: &str,
        display_name: &str,
        is_admin: bool,
        api_token: &str,
        created_at: &str,
    ) -> Result<User> {
        let row = users::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(password_hash.to_string()),
            display_name: Set(display_name.to_string()),
            is_admin: Set(is_admin),
            api_token: Set(api_token.to_string()),
            created_at: Set(created_at.to_string()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert user")?;

        Ok(User::from(row))
    }

    /// Overwrite the mutable columns of an existing account.
    pub async fn update(&self, user: &User) -> Result<()> {
        let existing = users::Entity::find_by_id(user.id)
            .one(&self.conn)
            .await
            .context("Failed to query user for update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {}", user.id))?;

        let mut active: users::ActiveModel = existing.into();
        active.username = Set(user.username.clone());
        active.password_hash = Set(user.password_hash.clone());
        active.display_name = Set(user.display_name.clone());
        active.is_admin = Set(user.is_admin);
        active.api_token = Set(user.api_token.clone());
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn update_token(&self, id: i32, api_token: &str) -> Result<()> {
        let existing = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for token reset")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let mut active: users::ActiveModel = existing.into();
        active.api_token = Set(api_token.to_string());
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn delete(&self, id: i32) -> Result<()> {
        users::Entity::delete_many()
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to delete user")?;

        Ok(())
    }
}

/// Hash a password with Argon2id defaults.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
/// Runs on a blocking thread because Argon2 is CPU-heavy.
pub async fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();

    task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&password_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

        Ok::<bool, anyhow::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await
    .context("Password verification task panicked")?
}
