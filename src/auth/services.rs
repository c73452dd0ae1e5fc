use lazy_static::lazy_static;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    jwt::{JwtKeys, TokenPair},
    password::{hash_password, verify_password},
};
use crate::{
    error::AppError,
    state::AppState,
    store::{NewUser, ProfileUpdate, Role, User},
    validation,
};

lazy_static! {
    // Verified against on unknown emails so both login failures cost one argon2 run.
    static ref DUMMY_HASH: Option<String> = hash_password("promptmaster-dummy-password").ok();
}

fn issue(keys: &JwtKeys, user_id: Uuid) -> Result<TokenPair, AppError> {
    keys.issue_pair(user_id).map_err(|e| {
        error!(error = %e, %user_id, "jwt signing failed");
        AppError::Internal("token signing failed".into())
    })
}

fn hash(plain: &str) -> Result<String, AppError> {
    hash_password(plain).map_err(|e| AppError::Internal(e.to_string()))
}

pub async fn sign_up(
    state: &AppState,
    name: &str,
    email: &str,
    password: &str,
) -> Result<(User, TokenPair), AppError> {
    let input = validation::sign_up(name, email, password)?;

    if state.store.get_user_by_email(&input.email).await?.is_some() {
        warn!(email = %input.email, "email already registered");
        return Err(AppError::Conflict("Email already registered"));
    }

    let user = state
        .store
        .create_user(NewUser {
            name: input.name,
            email: input.email,
            password_hash: hash(&input.password)?,
            credits: state.config.signup_credits,
            role: Role::User,
        })
        .await?;

    let tokens = issue(&JwtKeys::from(&state.config.jwt), user.id)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((user, tokens))
}

pub async fn sign_in(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<(User, TokenPair), AppError> {
    let email = validation::sign_in(email, password)?;

    let Some(user) = state.store.get_user_by_email(&email).await? else {
        if let Some(dummy) = DUMMY_HASH.as_deref() {
            let _ = verify_password(password, dummy);
        }
        warn!(target: "security", severity = "low", event = "login_unknown_email", %email, "Security event: login failed");
        return Err(AppError::Auth("Invalid credentials"));
    };

    let hash = state
        .store
        .get_password_hash(user.id)
        .await?
        .ok_or(AppError::Auth("Invalid credentials"))?;
    let ok = verify_password(password, &hash).map_err(|e| AppError::Internal(e.to_string()))?;
    if !ok {
        warn!(target: "security", severity = "medium", event = "login_bad_password", user_id = %user.id, "Security event: login failed");
        return Err(AppError::Auth("Invalid credentials"));
    }

    let tokens = issue(&JwtKeys::from(&state.config.jwt), user.id)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok((user, tokens))
}

/// Re-reads the account so a deleted user cannot keep a session alive.
pub async fn current_identity(state: &AppState, user_id: Uuid) -> Result<User, AppError> {
    match state.store.get_user(user_id).await? {
        Some(user) => Ok(user),
        None => {
            warn!(target: "security", severity = "medium", event = "stale_session", %user_id, "Security event: token for a deleted account");
            Err(AppError::Auth("Account no longer exists"))
        }
    }
}

pub async fn refresh(state: &AppState, refresh_token: &str) -> Result<(User, TokenPair), AppError> {
    let keys = JwtKeys::from(&state.config.jwt);
    let claims = keys
        .verify_refresh(refresh_token)
        .map_err(|_| AppError::Auth("Invalid or expired token"))?
        .ok_or(AppError::Auth("Refresh token required"))?;

    let user = current_identity(state, claims.sub).await?;
    let tokens = issue(&keys, user.id)?;
    Ok((user, tokens))
}

pub async fn update_profile(
    state: &AppState,
    user_id: Uuid,
    name: Option<&str>,
    password: Option<&str>,
) -> Result<User, AppError> {
    let changes = validation::profile_update(name, password)?;
    let password_hash = changes.password.as_deref().map(hash).transpose()?;

    let user = state
        .store
        .update_user_profile(
            user_id,
            ProfileUpdate {
                name: changes.name,
                password_hash,
            },
        )
        .await?;
    info!(%user_id, password_changed = changes.password.is_some(), "profile updated");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_up_grants_starting_credits() {
        let state = AppState::fake();
        let (user, tokens) = sign_up(&state, "Ada", "Ada@Example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(user.credits, 10);
        assert_eq!(user.role, Role::User);
        assert_eq!(user.email, "ada@example.com");
        assert!(!tokens.access_token.is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_regardless_of_case() {
        let state = AppState::fake();
        sign_up(&state, "Ada", "ada@example.com", "secret1").await.unwrap();
        let err = sign_up(&state, "Ada", "ADA@example.com", "secret1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn sign_in_checks_password() {
        let state = AppState::fake();
        sign_up(&state, "Ada", "ada@example.com", "secret1").await.unwrap();

        assert!(sign_in(&state, "ada@example.com", "secret1").await.is_ok());
        let wrong = sign_in(&state, "ada@example.com", "secret2").await.unwrap_err();
        let unknown = sign_in(&state, "bob@example.com", "secret1").await.unwrap_err();
        assert_eq!(wrong.user_message(), unknown.user_message());
    }

    #[test]
    fn dummy_hash_is_verifiable_and_matches_nothing_real() {
        let dummy = DUMMY_HASH.as_deref().expect("dummy hash");
        assert!(!verify_password("secret1", dummy).unwrap());
    }

    #[tokio::test]
    async fn refresh_fails_after_account_deletion() {
        let state = AppState::fake();
        let (user, tokens) = sign_up(&state, "Ada", "ada@example.com", "secret1")
            .await
            .unwrap();
        assert!(refresh(&state, &tokens.refresh_token).await.is_ok());
        assert!(refresh(&state, &tokens.access_token).await.is_err());

        state.store.delete_user(user.id).await.unwrap();
        let err = refresh(&state, &tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn password_change_takes_effect() {
        let state = AppState::fake();
        let (user, _) = sign_up(&state, "Ada", "ada@example.com", "secret1")
            .await
            .unwrap();

        let updated = update_profile(&state, user.id, None, Some("secret2"))
            .await
            .unwrap();
        assert_eq!(updated.name, "Ada");
        assert!(sign_in(&state, "ada@example.com", "secret1").await.is_err());
        assert!(sign_in(&state, "ada@example.com", "secret2").await.is_ok());
    }
}
