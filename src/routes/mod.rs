use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AdminSession, state::AppState};

pub mod admin;
pub mod auth;
pub mod health;
pub mod registrations;

pub fn create_router(state: AppState) -> Router<()> {
    let allow_origin = match state.config.cors_allowed_origin.as_deref() {
        Some(origins) => AllowOrigin::list(parse_origins(origins)),
        None => AllowOrigin::mirror_request(),
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let public_admin_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout));

    let protected_state = state.clone();
    let guarded_admin_routes = Router::new()
        .route("/auth", get(auth::session_status))
        .route("/registrations", get(admin::list_registrations))
        .route("/registrations/export", get(admin::export_registrations))
        .route("/stats", get(admin::registration_stats))
        .route("/verify/:id", post(admin::verify_registration))
        .route("/reject/:id", post(admin::reject_registration))
        .route("/checkin/:id", post(admin::check_in_registration))
        .layer(middleware::from_extractor_with_state::<AdminSession, _>(
            protected_state,
        ));

    Router::new()
        .route("/api/register", post(registrations::register))
        .nest(
            "/api/admin",
            public_admin_routes.merge(guarded_admin_routes),
        )
        .route("/api/health", get(health::health_check))
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .filter_map(|value| match value.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(err) => {
                warn!(origin = %value, error = %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}
