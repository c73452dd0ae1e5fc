use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    active_since, NewPromptEntry, NewUser, ProfileUpdate, PromptEntry, Result, Role, Store,
    StoreError, SystemMetrics, User,
};

const USERS_DOC: &str = "users.json";
const HISTORY_DOC: &str = "history.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    #[serde(flatten)]
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct Documents {
    users: Vec<UserRecord>,
    /// Append order, oldest first.
    history: Vec<PromptEntry>,
}

/// The single mutex serializes every read-modify-write, so credit updates cannot lose
/// writes.
pub struct LocalStore {
    dir: Option<PathBuf>,
    seed: Option<NewUser>,
    docs: Mutex<Documents>,
}

impl LocalStore {
    pub async fn open(dir: &Path, seed: Option<NewUser>) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let users: Vec<UserRecord> = read_doc(&dir.join(USERS_DOC)).await?;
        let history: Vec<PromptEntry> = read_doc(&dir.join(HISTORY_DOC)).await?;
        debug!(users = users.len(), history = history.len(), "local store loaded");
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            seed,
            docs: Mutex::new(Documents { users, history }),
        })
    }

    /// Nothing touches the filesystem.
    #[cfg(test)]
    pub fn in_memory(seed: Option<NewUser>) -> Self {
        Self {
            dir: None,
            seed,
            docs: Mutex::new(Documents::default()),
        }
    }

    async fn commit_users(&self, docs: &mut Documents, users: Vec<UserRecord>) -> Result<()> {
        if let Some(dir) = &self.dir {
            write_doc(&dir.join(USERS_DOC), &users).await?;
        }
        docs.users = users;
        Ok(())
    }

    async fn commit_history(&self, docs: &mut Documents, history: Vec<PromptEntry>) -> Result<()> {
        if let Some(dir) = &self.dir {
            write_doc(&dir.join(HISTORY_DOC), &history).await?;
        }
        docs.history = history;
        Ok(())
    }
}

fn find_index(users: &[UserRecord], id: Uuid) -> Result<usize> {
    users
        .iter()
        .position(|r| r.user.id == id)
        .ok_or(StoreError::NotFound { entity: "user", id })
}

fn email_matches(stored: &str, wanted: &str) -> bool {
    stored.to_lowercase() == wanted.trim().to_lowercase()
}

async fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

async fn write_doc<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(items)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl Store for LocalStore {
    async fn init(&self) -> Result<()> {
        let Some(seed) = &self.seed else {
            return Ok(());
        };
        let mut docs = self.docs.lock().await;
        if docs.users.iter().any(|r| r.user.role == Role::Admin) {
            return Ok(());
        }
        if docs.users.iter().any(|r| email_matches(&r.user.email, &seed.email)) {
            warn!(email = %seed.email, "admin seed email belongs to a regular account; skipping seed");
            return Ok(());
        }

        let record = UserRecord {
            user: User {
                id: Uuid::new_v4(),
                name: seed.name.clone(),
                email: seed.email.to_lowercase(),
                credits: seed.credits,
                role: Role::Admin,
                created_at: OffsetDateTime::now_utc(),
            },
            password_hash: seed.password_hash.clone(),
        };
        info!(user_id = %record.user.id, email = %record.user.email, "seeded administrator account");

        // Admin goes first, matching the order an operator expects in listings.
        let mut users = Vec::with_capacity(docs.users.len() + 1);
        users.push(record);
        users.extend(docs.users.iter().cloned());
        self.commit_users(&mut docs, users).await
    }

    async fn get_users(&self) -> Result<Vec<User>> {
        let docs = self.docs.lock().await;
        Ok(docs.users.iter().map(|r| r.user.clone()).collect())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let docs = self.docs.lock().await;
        Ok(docs
            .users
            .iter()
            .find(|r| r.user.id == id)
            .map(|r| r.user.clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let docs = self.docs.lock().await;
        Ok(docs
            .users
            .iter()
            .find(|r| email_matches(&r.user.email, email))
            .map(|r| r.user.clone()))
    }

    async fn get_password_hash(&self, id: Uuid) -> Result<Option<String>> {
        let docs = self.docs.lock().await;
        Ok(docs
            .users
            .iter()
            .find(|r| r.user.id == id)
            .map(|r| r.password_hash.clone()))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let mut docs = self.docs.lock().await;
        if docs
            .users
            .iter()
            .any(|r| email_matches(&r.user.email, &new_user.email))
        {
            return Err(StoreError::EmailTaken);
        }

        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email.trim().to_lowercase(),
            credits: new_user.credits,
            role: new_user.role,
            created_at: OffsetDateTime::now_utc(),
        };
        let mut users = docs.users.clone();
        users.push(UserRecord {
            user: user.clone(),
            password_hash: new_user.password_hash,
        });
        self.commit_users(&mut docs, users).await?;
        Ok(user)
    }

    async fn update_user_credits(&self, id: Uuid, delta: i64) -> Result<User> {
        let mut docs = self.docs.lock().await;
        let idx = find_index(&docs.users, id)?;
        let balance = docs.users[idx].user.credits;
        let new_balance = balance.saturating_add(delta);
        if new_balance < 0 {
            return Err(StoreError::InsufficientBalance { balance, delta });
        }

        let mut users = docs.users.clone();
        users[idx].user.credits = new_balance;
        let updated = users[idx].user.clone();
        self.commit_users(&mut docs, users).await?;
        Ok(updated)
    }

    async fn save_prompt_history(&self, entry: NewPromptEntry) -> Result<PromptEntry> {
        let mut docs = self.docs.lock().await;
        let stored = PromptEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            kind: entry.kind,
            prompt: entry.prompt,
            output: entry.output,
            created_at: OffsetDateTime::now_utc(),
        };
        let mut history = docs.history.clone();
        history.push(stored.clone());
        self.commit_history(&mut docs, history).await?;
        Ok(stored)
    }

    async fn get_user_history(&self, user_id: Uuid) -> Result<Vec<PromptEntry>> {
        let docs = self.docs.lock().await;
        Ok(docs
            .history
            .iter()
            .rev()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_user_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<User> {
        let mut docs = self.docs.lock().await;
        let idx = find_index(&docs.users, id)?;

        let mut users = docs.users.clone();
        if let Some(name) = update.name {
            users[idx].user.name = name;
        }
        if let Some(hash) = update.password_hash {
            users[idx].password_hash = hash;
        }
        let updated = users[idx].user.clone();
        self.commit_users(&mut docs, users).await?;
        Ok(updated)
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        let mut docs = self.docs.lock().await;
        find_index(&docs.users, id)?;
        let users = docs
            .users
            .iter()
            .filter(|r| r.user.id != id)
            .cloned()
            .collect();
        self.commit_users(&mut docs, users).await
    }

    async fn get_system_metrics(&self) -> Result<SystemMetrics> {
        let docs = self.docs.lock().await;
        let regular: HashSet<Uuid> = docs
            .users
            .iter()
            .filter(|r| r.user.role != Role::Admin)
            .map(|r| r.user.id)
            .collect();
        let total_credits = docs
            .users
            .iter()
            .filter(|r| r.user.role != Role::Admin)
            .map(|r| r.user.credits)
            .sum();

        let since = active_since();
        let active: HashSet<Uuid> = docs
            .history
            .iter()
            .filter(|h| h.created_at >= since && regular.contains(&h.user_id))
            .map(|h| h.user_id)
            .collect();

        Ok(SystemMetrics {
            total_users: regular.len() as i64,
            total_credits,
            total_prompts: docs.history.len() as i64,
            active_users: active.len() as i64,
        })
    }
}
