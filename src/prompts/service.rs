use tracing::{error, info, warn};
use uuid::Uuid;

use super::generator::GenerationError;
use crate::{
    error::AppError,
    state::AppState,
    store::{NewPromptEntry, PromptEntry, StoreError},
    validation,
};

#[derive(Debug)]
pub struct Generated {
    pub entry: PromptEntry,
    /// Balance after the debit.
    pub credits: i64,
}

/// Any failing step aborts the rest; a failure after the debit refunds the credit.
pub async fn generate_prompt(
    state: &AppState,
    user_id: Uuid,
    kind: &str,
    description: &str,
) -> Result<Generated, AppError> {
    let (kind, description) = validation::generation_request(kind, description)?;

    let key = user_id.to_string();
    if !state.limiter.check_limit(&key) {
        let retry_after_secs = state.limiter.get_reset_time(&key).max(1);
        warn!(
            target: "security",
            severity = "medium",
            event = "rate_limit_exceeded",
            %user_id,
            retry_after_secs,
            "Security event: generation rate limit exceeded"
        );
        return Err(AppError::RateLimited { retry_after_secs });
    }

    let debited = match state.store.update_user_credits(user_id, -1).await {
        Ok(user) => user,
        Err(StoreError::InsufficientBalance { .. }) => {
            info!(%user_id, "generation refused: no credits");
            return Err(AppError::InsufficientCredits);
        }
        Err(StoreError::NotFound { .. }) => {
            return Err(AppError::Auth("Account no longer exists"));
        }
        Err(e) => {
            error!(error = %e, %user_id, "credit debit failed");
            return Err(e.into());
        }
    };

    let output = match state.generator.generate(kind, &description).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => return Err(refund_after(state, user_id, GenerationError::Empty.into()).await),
        Err(e) => {
            error!(error = %e, %user_id, model = state.generator.model_name(), "generation failed");
            return Err(refund_after(state, user_id, e.into()).await);
        }
    };

    let entry = match state
        .store
        .save_prompt_history(NewPromptEntry {
            user_id,
            kind,
            prompt: description,
            output,
        })
        .await
    {
        Ok(entry) => entry,
        Err(e) => {
            error!(error = %e, %user_id, "saving prompt history failed");
            return Err(refund_after(state, user_id, e.into()).await);
        }
    };

    info!(%user_id, entry_id = %entry.id, kind = %kind, credits = debited.credits, "prompt generated");
    Ok(Generated {
        entry,
        credits: debited.credits,
    })
}

/// Gives the debited credit back and passes `cause` through.
async fn refund_after(state: &AppState, user_id: Uuid, cause: AppError) -> AppError {
    match state.store.update_user_credits(user_id, 1).await {
        Ok(user) => info!(%user_id, credits = user.credits, "credit refunded"),
        Err(e) => error!(error = %e, %user_id, "credit refund failed"),
    }
    cause
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state::testing::{FakeGenerator, FakeReply, HistoryWriteFails};
    use crate::store::{local::LocalStore, NewUser, Role, User};

    async fn user_with_credits(state: &AppState, credits: i64) -> User {
        state
            .store
            .create_user(NewUser {
                name: "Ada".into(),
                email: format!("{}@example.com", Uuid::new_v4()),
                password_hash: "hash".into(),
                credits,
                role: Role::User,
            })
            .await
            .unwrap()
    }

    const DESCRIPTION: &str = "an online booking site for a dental clinic";

    #[tokio::test]
    async fn success_debits_one_credit_and_records_history() {
        let state = AppState::fake();
        let user = user_with_credits(&state, 2).await;

        let generated = generate_prompt(&state, user.id, "Site", DESCRIPTION)
            .await
            .unwrap();
        assert_eq!(generated.credits, 1);
        assert_eq!(generated.entry.prompt, DESCRIPTION);
        assert!(generated.entry.output.contains("[Site]"));

        let history = state.store.get_user_history(user.id).await.unwrap();
        assert_eq!(history, vec![generated.entry]);
    }

    #[tokio::test]
    async fn empty_balance_stops_before_the_provider() {
        let generator = Arc::new(FakeGenerator::new(FakeReply::Text("ok".into())));
        let state = AppState::fake_with(generator.clone());
        let user = user_with_credits(&state, 1).await;

        generate_prompt(&state, user.id, "SaaS", DESCRIPTION).await.unwrap();
        let err = generate_prompt(&state, user.id, "SaaS", DESCRIPTION)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InsufficientCredits));
        assert_eq!(generator.calls(), 1);
        let reloaded = state.store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.credits, 0);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_limiter_or_store() {
        let generator = Arc::new(FakeGenerator::new(FakeReply::Text("ok".into())));
        let state = AppState::fake_with(generator.clone());
        let user = user_with_credits(&state, 5).await;

        let err = generate_prompt(&state, user.id, "Site", "short").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(generator.calls(), 0);
        assert_eq!(state.limiter.get_remaining_requests(&user.id.to_string()), 3);
        assert_eq!(state.store.get_user(user.id).await.unwrap().unwrap().credits, 5);
    }

    #[tokio::test]
    async fn provider_failure_refunds_the_credit() {
        let generator = Arc::new(FakeGenerator::new(FakeReply::Unavailable));
        let state = AppState::fake_with(generator.clone());
        let user = user_with_credits(&state, 3).await;

        let err = generate_prompt(&state, user.id, "Site", DESCRIPTION)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Generation(GenerationError::Timeout(_))));
        assert_eq!(state.store.get_user(user.id).await.unwrap().unwrap().credits, 3);
        assert!(state.store.get_user_history(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_output_is_not_a_success() {
        let generator = Arc::new(FakeGenerator::new(FakeReply::Empty));
        let state = AppState::fake_with(generator);
        let user = user_with_credits(&state, 3).await;

        let err = generate_prompt(&state, user.id, "Site", DESCRIPTION)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Generation(GenerationError::Empty)));
        assert_eq!(state.store.get_user(user.id).await.unwrap().unwrap().credits, 3);
    }

    #[tokio::test]
    async fn failed_history_write_refunds_the_credit() {
        let generator = Arc::new(FakeGenerator::new(FakeReply::Text("ok".into())));
        let store = Arc::new(HistoryWriteFails(LocalStore::in_memory(None)));
        let state = AppState::fake_with_store(store, generator.clone());
        let user = user_with_credits(&state, 2).await;

        let err = generate_prompt(&state, user.id, "SaaS", DESCRIPTION)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(StoreError::Io(_))));
        assert_eq!(generator.calls(), 1);
        assert_eq!(state.store.get_user(user.id).await.unwrap().unwrap().credits, 2);
    }

    #[tokio::test]
    async fn rate_limit_rejects_with_retry_after() {
        let generator = Arc::new(FakeGenerator::new(FakeReply::Text("ok".into())));
        let state = AppState::fake_with(generator.clone());
        let user = user_with_credits(&state, 10).await;

        for _ in 0..3 {
            generate_prompt(&state, user.id, "Site", DESCRIPTION).await.unwrap();
        }
        let err = generate_prompt(&state, user.id, "Site", DESCRIPTION)
            .await
            .unwrap_err();
        let AppError::RateLimited { retry_after_secs } = err else {
            panic!("expected rate limit, got {err:?}");
        };
        assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
        assert_eq!(generator.calls(), 3);
        assert_eq!(state.store.get_user(user.id).await.unwrap().unwrap().credits, 7);

        generator.set_reply(FakeReply::Text("again".into()));
        state.limiter.reset(&user.id.to_string());
        assert!(generate_prompt(&state, user.id, "Site", DESCRIPTION).await.is_ok());
    }
}
