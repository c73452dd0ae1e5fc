use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role. Fixed at creation; no operation changes it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Generation category. Closed set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PromptType {
    #[serde(rename = "Site", alias = "site", alias = "WEBSITE")]
    Website,
    #[serde(rename = "SaaS", alias = "saas", alias = "SAAS")]
    Saas,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptType::Website => "Site",
            PromptType::Saas => "SaaS",
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "site" | "website" => Ok(PromptType::Website),
            "saas" => Ok(PromptType::Saas),
            other => Err(format!("unknown prompt type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub credits: i64,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// History record of one successful generation. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: PromptType,
    pub prompt: String,
    pub output: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Input for `Store::create_user`. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub credits: i64,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewPromptEntry {
    pub user_id: Uuid,
    pub kind: PromptType,
    pub prompt: String,
    pub output: String,
}

/// Partial profile update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub total_users: i64,
    pub total_credits: i64,
    pub total_prompts: i64,
    pub active_users: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_type_parses_known_categories() {
        assert_eq!("Site".parse::<PromptType>().unwrap(), PromptType::Website);
        assert_eq!(" saas ".parse::<PromptType>().unwrap(), PromptType::Saas);
        assert!("mobile".parse::<PromptType>().is_err());
    }

    #[test]
    fn prompt_entry_serializes_type_tag() {
        let entry = PromptEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: PromptType::Saas,
            prompt: "a billing dashboard".into(),
            output: "# Spec".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "SaaS");
    }

    #[test]
    fn metrics_use_camel_case_keys() {
        let json = serde_json::to_string(&SystemMetrics::default()).unwrap();
        assert!(json.contains("totalUsers"));
        assert!(json.contains("activeUsers"));
    }
}
