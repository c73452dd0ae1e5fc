use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    active_since, NewPromptEntry, NewUser, ProfileUpdate, PromptEntry, PromptType, Result, Role,
    Store, StoreError, SystemMetrics, User,
};

const USER_COLUMNS: &str = "id, name, email, credits, role, created_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    credits: i64,
    role: String,
    created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self> {
        let role = r.role.parse::<Role>().map_err(|_| StoreError::InvalidValue {
            column: "users.role",
            value: r.role.clone(),
        })?;
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            credits: r.credits,
            role,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    prompt: String,
    output: String,
    created_at: OffsetDateTime,
}

impl TryFrom<HistoryRow> for PromptEntry {
    type Error = StoreError;

    fn try_from(r: HistoryRow) -> Result<Self> {
        let kind = r.kind.parse::<PromptType>().map_err(|_| StoreError::InvalidValue {
            column: "prompt_history.kind",
            value: r.kind.clone(),
        })?;
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            kind,
            prompt: r.prompt,
            output: r.output,
            created_at: r.created_at,
        })
    }
}

/// Remote backend over Postgres.
pub struct PgStore {
    db: PgPool,
    seed: Option<NewUser>,
}

impl PgStore {
    pub fn new(db: PgPool, seed: Option<NewUser>) -> Self {
        Self { db, seed }
    }

    async fn insert_user(&self, new_user: &NewUser) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, credits, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.name)
        .bind(new_user.email.trim().to_lowercase())
        .bind(&new_user.password_hash)
        .bind(new_user.credits)
        .bind(new_user.role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::EmailTaken,
            other => StoreError::Database(other),
        })?;
        row.try_into()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn init(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;

        let Some(seed) = &self.seed else {
            return Ok(());
        };
        let (admins,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = 'ADMIN'")
                .fetch_one(&self.db)
                .await?;
        if admins > 0 {
            return Ok(());
        }

        match self.insert_user(seed).await {
            Ok(admin) => {
                info!(user_id = %admin.id, email = %admin.email, "seeded administrator account");
                Ok(())
            }
            Err(StoreError::EmailTaken) => {
                warn!(email = %seed.email, "admin seed email belongs to a regular account; skipping seed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.trim())
        .fetch_optional(&self.db)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn get_password_hash(&self, id: Uuid) -> Result<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(hash)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        self.insert_user(&new_user).await
    }

    async fn update_user_credits(&self, id: Uuid, delta: i64) -> Result<User> {
        // Single conditional UPDATE: the floor check and the write happen atomically.
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET credits = credits + $2
             WHERE id = $1 AND credits + $2 >= 0
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(delta)
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = row {
            return row.try_into();
        }

        let balance = sqlx::query_scalar::<_, i64>("SELECT credits FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        match balance {
            Some(balance) => Err(StoreError::InsufficientBalance { balance, delta }),
            None => Err(StoreError::NotFound { entity: "user", id }),
        }
    }

    async fn save_prompt_history(&self, entry: NewPromptEntry) -> Result<PromptEntry> {
        let row = sqlx::query_as::<_, HistoryRow>(
            r#"
            INSERT INTO prompt_history (id, user_id, kind, prompt, output)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, kind, prompt, output, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.kind.as_str())
        .bind(&entry.prompt)
        .bind(&entry.output)
        .fetch_one(&self.db)
        .await?;
        row.try_into()
    }

    async fn get_user_history(&self, user_id: Uuid) -> Result<Vec<PromptEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, user_id, kind, prompt, output, created_at
              FROM prompt_history
             WHERE user_id = $1
             ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(PromptEntry::try_from).collect()
    }

    async fn update_user_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   password_hash = COALESCE($3, password_hash)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.password_hash)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound { entity: "user", id })?;
        row.try_into()
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "user", id });
        }
        Ok(())
    }

    async fn get_system_metrics(&self) -> Result<SystemMetrics> {
        let (total_users, total_credits, total_prompts, active_users): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM users WHERE role <> 'ADMIN'),
                    (SELECT COALESCE(SUM(credits), 0)::BIGINT FROM users WHERE role <> 'ADMIN'),
                    (SELECT COUNT(*) FROM prompt_history),
                    (SELECT COUNT(DISTINCT h.user_id)
                       FROM prompt_history h
                       JOIN users u ON u.id = h.user_id
                      WHERE u.role <> 'ADMIN' AND h.created_at >= $1)
                "#,
            )
            .bind(active_since())
            .fetch_one(&self.db)
            .await?;

        Ok(SystemMetrics {
            total_users,
            total_credits,
            total_prompts,
            active_users,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_row(role: &str) -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            credits: 10,
            role: role.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn user_row_maps_role() {
        let user = User::try_from(user_row("ADMIN")).unwrap();
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn user_row_rejects_unknown_role() {
        let err = User::try_from(user_row("ROOT")).unwrap_err();
        assert!(err.to_string().contains("users.role"));
    }

    #[test]
    fn history_row_maps_kind() {
        let row = HistoryRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: "SaaS".into(),
            prompt: "crm for bakeries".into(),
            output: "# CRM".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        let entry = PromptEntry::try_from(row).unwrap();
        assert_eq!(entry.kind, PromptType::Saas);
    }

    // The tests below need a Postgres server: `DATABASE_URL=... cargo test -- --ignored`.

    fn new_user(email: &str, credits: i64, role: Role) -> NewUser {
        NewUser {
            name: "Ada".into(),
            email: email.into(),
            password_hash: "hash".into(),
            credits,
            role,
        }
    }

    async fn store(pool: PgPool) -> PgStore {
        let store = PgStore::new(pool, None);
        store.init().await.unwrap();
        store
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn credit_floor_is_enforced_in_sql(pool: PgPool) {
        let store = store(pool).await;
        let user = store
            .create_user(new_user("ada@example.com", 10, Role::User))
            .await
            .unwrap();

        let err = store.update_user_credits(user.id, -15).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientBalance { balance: 10, delta: -15 }
        ));
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().credits, 10);

        assert_eq!(store.update_user_credits(user.id, -10).await.unwrap().credits, 0);
        let err = store.update_user_credits(Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn email_is_unique_ignoring_case(pool: PgPool) {
        let store = store(pool).await;
        store
            .create_user(new_user("Ada@Example.com", 10, Role::User))
            .await
            .unwrap();

        let found = store.get_user_by_email("ADA@example.COM").await.unwrap();
        assert_eq!(found.unwrap().email, "ada@example.com");

        let err = store
            .create_user(new_user("ada@example.com", 10, Role::User))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmailTaken));
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn history_and_metrics(pool: PgPool) {
        let store = PgStore::new(pool, Some(new_user("root@example.com", 999_999, Role::Admin)));
        store.init().await.unwrap();
        store.init().await.unwrap();

        let a = store
            .create_user(new_user("a@example.com", 5, Role::User))
            .await
            .unwrap();
        store
            .create_user(new_user("b@example.com", 3, Role::User))
            .await
            .unwrap();

        for prompt in ["first landing page", "second landing page"] {
            store
                .save_prompt_history(NewPromptEntry {
                    user_id: a.id,
                    kind: PromptType::Website,
                    prompt: prompt.into(),
                    output: "# Spec".into(),
                })
                .await
                .unwrap();
        }
        let history = store.get_user_history(a.id).await.unwrap();
        let prompts: Vec<_> = history.iter().map(|h| h.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["second landing page", "first landing page"]);

        let metrics = store.get_system_metrics().await.unwrap();
        assert_eq!(
            metrics,
            SystemMetrics {
                total_users: 2,
                total_credits: 8,
                total_prompts: 2,
                active_users: 1,
            }
        );

        store.delete_user(a.id).await.unwrap();
        assert_eq!(store.get_user_history(a.id).await.unwrap().len(), 2);
        assert_eq!(store.get_users().await.unwrap().len(), 2);
    }
}
