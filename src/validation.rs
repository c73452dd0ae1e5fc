use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::store::PromptType;

pub const MIN_NAME_LEN: usize = 2;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_DESCRIPTION_LEN: usize = 10;
pub const MAX_DESCRIPTION_LEN: usize = 4000;
pub const MAX_CREDIT_DELTA: i64 = 1_000_000;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Collects field errors so a request reports all of them at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn check<T>(&mut self, result: Result<T, FieldError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

/// Trims and lower-cases; this is the canonical form used for uniqueness.
pub fn normalize_email(raw: &str) -> Result<String, FieldError> {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    let email = raw.trim().to_lowercase();
    if EMAIL_RE.is_match(&email) {
        Ok(email)
    } else {
        Err(FieldError::new("email", "Invalid email format"))
    }
}

pub fn validate_password(password: &str) -> Result<(), FieldError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(FieldError::new(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

pub fn validate_name(raw: &str) -> Result<String, FieldError> {
    let name = raw.trim();
    if name.chars().count() < MIN_NAME_LEN {
        return Err(FieldError::new(
            "name",
            format!("Name must be at least {MIN_NAME_LEN} characters"),
        ));
    }
    Ok(name.to_string())
}

pub fn parse_prompt_type(raw: &str) -> Result<PromptType, FieldError> {
    raw.parse()
        .map_err(|_| FieldError::new("type", "Type must be one of: Site, SaaS"))
}

pub fn validate_description(raw: &str) -> Result<String, FieldError> {
    let description = raw.trim();
    let len = description.chars().count();
    if len < MIN_DESCRIPTION_LEN {
        return Err(FieldError::new(
            "description",
            format!("Description must be at least {MIN_DESCRIPTION_LEN} characters long"),
        ));
    }
    if len > MAX_DESCRIPTION_LEN {
        return Err(FieldError::new(
            "description",
            format!("Description must be at most {MAX_DESCRIPTION_LEN} characters long"),
        ));
    }
    Ok(description.to_string())
}

pub fn validate_credit_delta(delta: i64) -> Result<i64, FieldError> {
    if delta == 0 {
        return Err(FieldError::new("amount", "Amount must not be zero"));
    }
    if delta.abs() > MAX_CREDIT_DELTA {
        return Err(FieldError::new(
            "amount",
            format!("Amount must be within ±{MAX_CREDIT_DELTA}"),
        ));
    }
    Ok(delta)
}

pub fn parse_user_id(raw: &str) -> Result<Uuid, FieldError> {
    Uuid::parse_str(raw.trim()).map_err(|_| FieldError::new("id", "Invalid user identifier"))
}

pub struct SignUp {
    pub name: String,
    pub email: String,
    pub password: String,
}

pub fn sign_up(name: &str, email: &str, password: &str) -> Result<SignUp, AppError> {
    let mut v = Validator::default();
    let name = v.check(validate_name(name));
    let email = v.check(normalize_email(email));
    v.check(validate_password(password));
    v.finish()?;
    match (name, email) {
        (Some(name), Some(email)) => Ok(SignUp {
            name,
            email,
            password: password.to_string(),
        }),
        _ => Err(AppError::Internal("validator accepted incomplete sign-up".into())),
    }
}

/// Returns the normalized email.
pub fn sign_in(email: &str, password: &str) -> Result<String, AppError> {
    let mut v = Validator::default();
    let email = v.check(normalize_email(email));
    v.check(validate_password(password));
    v.finish()?;
    email.ok_or_else(|| AppError::Internal("validator accepted missing email".into()))
}

pub struct ProfileChanges {
    pub name: Option<String>,
    pub password: Option<String>,
}

/// At least one field must be present. A blank password counts as absent.
pub fn profile_update(
    name: Option<&str>,
    password: Option<&str>,
) -> Result<ProfileChanges, AppError> {
    let password = password.filter(|p| !p.trim().is_empty());
    if name.is_none() && password.is_none() {
        return Err(FieldError::new("profile", "Provide a name or a password to update").into());
    }

    let mut v = Validator::default();
    let name = name.and_then(|n| v.check(validate_name(n)));
    if let Some(p) = password {
        v.check(validate_password(p));
    }
    v.finish()?;
    Ok(ProfileChanges {
        name,
        password: password.map(str::to_string),
    })
}

pub fn generation_request(kind: &str, description: &str) -> Result<(PromptType, String), AppError> {
    let mut v = Validator::default();
    let kind = v.check(parse_prompt_type(kind));
    let description = v.check(validate_description(description));
    v.finish()?;
    match (kind, description) {
        (Some(kind), Some(description)) => Ok((kind, description)),
        _ => Err(AppError::Internal("validator accepted incomplete request".into())),
    }
}

/// Returns the target user id and the signed delta.
pub fn credit_adjustment(target: &str, delta: i64) -> Result<(Uuid, i64), AppError> {
    let mut v = Validator::default();
    let target = v.check(parse_user_id(target));
    let delta = v.check(validate_credit_delta(delta));
    v.finish()?;
    match (target, delta) {
        (Some(target), Some(delta)) => Ok((target, delta)),
        _ => Err(AppError::Internal("validator accepted incomplete adjustment".into())),
    }
}
