use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::prompts::generator::GenerationError;
use crate::store::StoreError;
use crate::validation::FieldError;

/// Every failure a caller can see. Messages are user-safe; internal detail stays in logs.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    Auth(&'static str),

    #[error("administrator role required")]
    Forbidden,

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("insufficient credits")]
    InsufficientCredits,

    #[error("insufficient balance (balance={balance}, delta={delta})")]
    InsufficientBalance { balance: i64, delta: i64 },

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{0}")]
    Conflict(&'static str),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Persistence(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, .. } => AppError::NotFound { entity },
            StoreError::EmailTaken => AppError::Conflict("Email already registered"),
            StoreError::InsufficientBalance { balance, delta } => {
                AppError::InsufficientBalance { balance, delta }
            }
            other => AppError::Persistence(other),
        }
    }
}

impl From<FieldError> for AppError {
    fn from(e: FieldError) -> Self {
        AppError::Validation(vec![e])
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Auth(_) => "auth_error",
            AppError::Forbidden => "forbidden",
            AppError::RateLimited { .. } => "rate_limit_error",
            AppError::InsufficientCredits => "insufficient_credits",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::NotFound { .. } => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Generation(_) => "generation_service_error",
            AppError::Persistence(_) => "persistence_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            AppError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Generation(_) => StatusCode::BAD_GATEWAY,
            AppError::Persistence(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text safe to show an end user.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(fields) => fields
                .iter()
                .map(|f| f.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            AppError::Auth(msg) | AppError::Conflict(msg) => (*msg).to_string(),
            AppError::Forbidden => "Administrator access required.".into(),
            AppError::RateLimited { retry_after_secs } => {
                format!("Too many requests. Try again in {retry_after_secs} seconds.")
            }
            AppError::InsufficientCredits => {
                "You have no credits left. Contact an administrator to top up.".into()
            }
            AppError::InsufficientBalance { balance, .. } => format!(
                "Insufficient balance: the adjustment would take the balance ({balance}) below zero."
            ),
            AppError::NotFound { entity } => format!("The requested {entity} was not found."),
            AppError::Generation(GenerationError::Empty) => {
                "The generation service returned an empty result. Please try again.".into()
            }
            AppError::Generation(GenerationError::NotConfigured) => {
                "The generation service is not configured. Contact the administrator.".into()
            }
            AppError::Generation(_) => {
                "The generation service is unavailable. Please try again shortly.".into()
            }
            AppError::Persistence(_) | AppError::Internal(_) => {
                "Something went wrong while saving your data. Please try again.".into()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, kind = self.kind(), "request failed");
        } else {
            warn!(error = %self, kind = self.kind(), "request rejected");
        }

        let retry_after = match &self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        let body = ErrorBody {
            error: self.kind(),
            message: self.user_message(),
            fields: match &self {
                AppError::Validation(fields) => Some(fields.clone()),
                _ => None,
            },
            retry_after,
        };

        let mut res = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(v) = HeaderValue::from_str(&secs.to_string()) {
                res.headers_mut().insert(header::RETRY_AFTER, v);
            }
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let id = Uuid::new_v4();
        assert!(matches!(
            AppError::from(StoreError::NotFound { entity: "user", id }),
            AppError::NotFound { entity: "user" }
        ));
        assert!(matches!(
            AppError::from(StoreError::InsufficientBalance { balance: 10, delta: -15 }),
            AppError::InsufficientBalance { balance: 10, .. }
        ));
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(matches!(
            AppError::from(StoreError::Io(io)),
            AppError::Persistence(_)
        ));
    }

    #[test]
    fn provider_details_never_reach_the_user() {
        let err = AppError::from(GenerationError::Status {
            status: 500,
            body: "secret upstream trace".into(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(!err.user_message().contains("secret"));
    }

    #[test]
    fn empty_generation_has_distinct_message() {
        let empty = AppError::from(GenerationError::Empty).user_message();
        let down = AppError::from(GenerationError::Timeout(std::time::Duration::from_secs(1)))
            .user_message();
        assert_ne!(empty, down);
        assert!(empty.contains("empty"));
    }

    #[test]
    fn rate_limited_sets_retry_after_header() {
        let res = AppError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()[header::RETRY_AFTER], "42");
    }
}
