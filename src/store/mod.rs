pub mod error;
pub mod local;
pub mod models;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::AppConfig;

pub use error::{Result, StoreError};
pub use models::{
    NewPromptEntry, NewUser, ProfileUpdate, PromptEntry, PromptType, Role, SystemMetrics, User,
};

/// Trailing period used for the "active users" metric.
pub const ACTIVE_USER_WINDOW: Duration = Duration::days(30);

/// Starting balance of the seeded administrator account.
pub const ADMIN_SEED_CREDITS: i64 = 999_999;

#[async_trait]
pub trait Store: Send + Sync {
    /// Idempotent setup: schema (remote mode) and the administrator seed.
    async fn init(&self) -> Result<()>;

    async fn get_users(&self) -> Result<Vec<User>>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    /// Case-insensitive match on email.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn get_password_hash(&self, id: Uuid) -> Result<Option<String>>;
    async fn create_user(&self, new_user: NewUser) -> Result<User>;

    /// Atomically applies `delta` to the balance. Fails with
    /// [`StoreError::InsufficientBalance`] and leaves the balance untouched if the result
    /// would be negative.
    async fn update_user_credits(&self, id: Uuid, delta: i64) -> Result<User>;

    async fn save_prompt_history(&self, entry: NewPromptEntry) -> Result<PromptEntry>;
    /// Entries of one user, newest first.
    async fn get_user_history(&self, user_id: Uuid) -> Result<Vec<PromptEntry>>;

    async fn update_user_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<User>;
    /// Hard delete of the account. History rows are kept.
    async fn delete_user(&self, id: Uuid) -> Result<()>;

    /// Aggregates over non-admin accounts; `active_users` counts distinct history authors
    /// within [`ACTIVE_USER_WINDOW`].
    async fn get_system_metrics(&self) -> Result<SystemMetrics>;
}

/// Builds the backend selected by configuration and runs its `init`.
pub async fn connect(config: &AppConfig, seed: Option<NewUser>) -> anyhow::Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let db = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await?;
            tracing::info!("storage: postgres");
            Arc::new(postgres::PgStore::new(db, seed))
        }
        None => {
            tracing::warn!(
                data_dir = %config.data_dir.display(),
                "DATABASE_URL not set; using local document store"
            );
            Arc::new(local::LocalStore::open(&config.data_dir, seed).await?)
        }
    };
    store.init().await?;
    Ok(store)
}

pub(crate) fn active_since() -> OffsetDateTime {
    OffsetDateTime::now_utc() - ACTIVE_USER_WINDOW
}
