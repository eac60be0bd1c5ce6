pub mod config;
pub mod db;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::AuthConfig;
use crate::services::{
    CredentialStore, CredentialVerifier, IdentityProvider, JwtService, RegistrationService,
    SessionManager,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::login_federated,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::logout_all,
        handlers::profile::get_profile,
        handlers::profile::update_profile,
    ),
    components(
        schemas(
            dtos::auth::RegisterRequest,
            dtos::auth::LoginRequest,
            dtos::auth::FederatedLoginRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::UpdateProfileRequest,
            dtos::auth::AuthResponse,
            dtos::auth::MessageResponse,
            dtos::auth::ProfileResponse,
            models::SanitizedUser,
            models::UserRole,
            services::TokenPair,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, login, and token lifecycle"),
        (name = "Profile", description = "Authenticated profile access"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub store: Arc<dyn CredentialStore>,
    pub provider: Arc<dyn IdentityProvider>,
    pub jwt: JwtService,
    pub registration: RegistrationService,
    pub verifier: CredentialVerifier,
    pub sessions: SessionManager,
}

impl AppState {
    /// Wire the core services over a store and a provider.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        provider: Arc<dyn IdentityProvider>,
        jwt: JwtService,
    ) -> Self {
        let registration = RegistrationService::new(store.clone(), provider.clone());
        let verifier = CredentialVerifier::new(store.clone(), provider.clone());
        let sessions = SessionManager::new(store.clone(), jwt.clone(), config.session.expiry_days);

        Self {
            config,
            store,
            provider,
            jwt,
            registration,
            verifier,
            sessions,
        }
    }
}

/// Initialize structured logging. `RUST_LOG` overrides the configured level.
pub fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();
}

/// Service health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "Observability"
)]
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/auth/logout", post(handlers::auth::logout))
        .route("/api/v1/auth/logout-all", post(handlers::auth::logout_all))
        .route(
            "/api/v1/auth/profile",
            get(handlers::profile::get_profile).put(handlers::profile::update_profile),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .route("/api/v1/auth/register", post(handlers::auth::register))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route(
            "/api/v1/auth/login/federated",
            post(handlers::auth::login_federated),
        )
        .route("/api/v1/auth/refresh", post(handlers::auth::refresh))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
