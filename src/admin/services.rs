use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    state::AppState,
    store::{SystemMetrics, User},
    validation,
};

pub async fn list_users(state: &AppState) -> Result<Vec<User>, AppError> {
    Ok(state.store.get_users().await?)
}

/// Applies a signed delta to a user's balance; the balance never goes below zero.
pub async fn adjust_credits(
    state: &AppState,
    admin: &User,
    target: &str,
    delta: i64,
) -> Result<User, AppError> {
    let (target_id, delta) = validation::credit_adjustment(target, delta)?;

    let user = state.store.update_user_credits(target_id, delta).await?;
    warn!(
        target: "security",
        severity = "low",
        event = "credits_adjusted",
        admin_id = %admin.id,
        user_id = %target_id,
        delta,
        balance = user.credits,
        "Security event: credits adjusted by administrator"
    );
    Ok(user)
}

/// Removes an account. History rows stay; administrator accounts are refused.
pub async fn delete_user(state: &AppState, admin: &User, target: &str) -> Result<(), AppError> {
    let target_id: Uuid = validation::parse_user_id(target)?;

    let Some(user) = state.store.get_user(target_id).await? else {
        return Err(AppError::NotFound { entity: "user" });
    };
    if user.is_admin() {
        return Err(AppError::Conflict("Administrator accounts cannot be deleted"));
    }

    state.store.delete_user(target_id).await?;
    state.limiter.reset(&target_id.to_string());
    warn!(
        target: "security",
        severity = "medium",
        event = "user_deleted",
        admin_id = %admin.id,
        user_id = %target_id,
        "Security event: user deleted by administrator"
    );
    Ok(())
}

pub async fn metrics(state: &AppState) -> Result<SystemMetrics, AppError> {
    let metrics = state.store.get_system_metrics().await?;
    info!(
        total_users = metrics.total_users,
        total_prompts = metrics.total_prompts,
        active_users = metrics.active_users,
        "system metrics computed"
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::service::generate_prompt;
    use crate::store::{NewUser, Role};

    async fn create(state: &AppState, email: &str, role: Role, credits: i64) -> User {
        state
            .store
            .create_user(NewUser {
                name: "Someone".into(),
                email: email.into(),
                password_hash: "hash".into(),
                credits,
                role,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn credit_adjustments_respect_the_floor() {
        let state = AppState::fake();
        let admin = create(&state, "root@example.com", Role::Admin, 999_999).await;
        let user = create(&state, "u@example.com", Role::User, 10).await;
        let id = user.id.to_string();

        let updated = adjust_credits(&state, &admin, &id, 5).await.unwrap();
        assert_eq!(updated.credits, 15);

        let err = adjust_credits(&state, &admin, &id, -20).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance { balance: 15, delta: -20 }));
        assert_eq!(state.store.get_user(user.id).await.unwrap().unwrap().credits, 15);
    }

    #[tokio::test]
    async fn credit_adjustment_rejects_bad_input() {
        let state = AppState::fake();
        let admin = create(&state, "root@example.com", Role::Admin, 1).await;

        let err = adjust_credits(&state, &admin, "not-a-uuid", 0).await.unwrap_err();
        let AppError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert_eq!(fields.len(), 2);

        let err = adjust_credits(&state, &admin, &Uuid::new_v4().to_string(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_keeps_history_and_protects_admins() {
        let state = AppState::fake();
        let admin = create(&state, "root@example.com", Role::Admin, 1).await;
        let user = create(&state, "u@example.com", Role::User, 5).await;
        generate_prompt(&state, user.id, "Site", "a landing page for a bakery")
            .await
            .unwrap();

        let err = delete_user(&state, &admin, &admin.id.to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        delete_user(&state, &admin, &user.id.to_string()).await.unwrap();
        assert!(state.store.get_user(user.id).await.unwrap().is_none());
        assert_eq!(state.store.get_user_history(user.id).await.unwrap().len(), 1);

        let err = delete_user(&state, &admin, &user.id.to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn metrics_count_regular_users_only() {
        let state = AppState::fake();
        create(&state, "root@example.com", Role::Admin, 1).await;
        let a = create(&state, "a@example.com", Role::User, 5).await;
        create(&state, "b@example.com", Role::User, 5).await;
        generate_prompt(&state, a.id, "SaaS", "a subscription tool for gyms")
            .await
            .unwrap();

        let m = metrics(&state).await.unwrap();
        assert_eq!(m.total_users, 2);
        assert_eq!(m.total_prompts, 1);
        assert_eq!(m.total_credits, 5 - 1 + 5);
        assert_eq!(m.active_users, 1);
    }
}
