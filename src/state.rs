use std::sync::Arc;

use rand::{distributions::Alphanumeric, Rng};

use crate::auth::password::hash_password;
use crate::config::AppConfig;
use crate::prompts::generator::{GeminiGenerator, TextGenerator};
use crate::rate_limit::RateLimiter;
use crate::store::{self, NewUser, Role, Store, ADMIN_SEED_CREDITS};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub limiter: Arc<RateLimiter>,
    pub generator: Arc<dyn TextGenerator>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let seed = admin_seed(&config)?;
        let store = store::connect(&config, Some(seed)).await?;
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let generator = Arc::new(GeminiGenerator::new(&config.generation)?) as Arc<dyn TextGenerator>;

        Ok(Self::from_parts(config, store, limiter, generator))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn Store>,
        limiter: Arc<RateLimiter>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            config,
            store,
            limiter,
            generator,
        }
    }
}

fn admin_seed(config: &AppConfig) -> anyhow::Result<NewUser> {
    let password = match &config.admin.password {
        Some(p) => p.clone(),
        None => {
            let generated: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(20)
                .map(char::from)
                .collect();
            tracing::warn!(
                email = %config.admin.email,
                password = %generated,
                "ADMIN_PASSWORD not set; generated a password for the administrator seed (used only if no admin exists yet)"
            );
            generated
        }
    };

    Ok(NewUser {
        name: config.admin.name.clone(),
        email: config.admin.email.clone(),
        password_hash: hash_password(&password)?,
        credits: ADMIN_SEED_CREDITS,
        role: Role::Admin,
    })
}
