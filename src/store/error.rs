use uuid::Uuid;

/// Errors raised by either storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("store: email already registered")]
    EmailTaken,

    /// Applying the delta would take the balance below zero. Nothing was written.
    #[error("store: insufficient balance (balance={balance}, delta={delta})")]
    InsufficientBalance { balance: i64, delta: i64 },

    #[error("store: invalid value in column '{column}': {value}")]
    InvalidValue { column: &'static str, value: String },

    #[error("store: database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store: migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("store: io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store: json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
