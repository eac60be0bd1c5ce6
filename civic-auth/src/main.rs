use std::sync::Arc;

use civic_auth::config::AuthConfig;
use civic_auth::db::{create_pool, run_migrations};
use civic_auth::error::AppError;
use civic_auth::services::{HttpIdentityProvider, JwtService, PgStore};
use civic_auth::{build_router, init_tracing, AppState};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AuthConfig::from_env()?;
    init_tracing(&config.log_level);

    tracing::info!(service = %config.service_name, "starting auth service");

    let pool = create_pool(&config.database).await?;
    run_migrations(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let provider = Arc::new(HttpIdentityProvider::new(&config.provider));
    let jwt = JwtService::new(&config.jwt)?;

    let port = config.port;
    let state = AppState::new(config, store, provider, jwt);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
