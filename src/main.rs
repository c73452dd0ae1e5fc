mod admin;
mod app;
mod auth;
mod config;
mod error;
mod prompts;
mod rate_limit;
mod state;
mod store;
mod validation;

/// Security events are logged under their own `security` target.
const DEFAULT_LOG_FILTER: &str = "promptmaster=debug,security=info,axum=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;
    let _cleanup = app_state.limiter.spawn_cleanup();
    tracing::info!(
        storage = app_state.config.storage_mode(),
        model = app_state.generator.model_name(),
        generation_configured = app_state.generator.is_configured(),
        "application state ready"
    );

    let app = app::build_app(app_state);
    app::serve(app).await
}

#[cfg(test)]
mod tests {
    use tracing::Level;
    use tracing_subscriber::EnvFilter;

    use super::DEFAULT_LOG_FILTER;

    #[test]
    fn default_filter_keeps_security_events() {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(DEFAULT_LOG_FILTER))
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: "security", Level::WARN));
            assert!(tracing::enabled!(target: "security", Level::INFO));
            assert!(tracing::enabled!(target: "promptmaster::admin::services", Level::DEBUG));
            assert!(!tracing::enabled!(target: "hyper", Level::INFO));
        });
    }
}
