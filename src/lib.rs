pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{
    state::AppState,
    utils::middleware::{auth_middleware, request_logging_middleware},
};

/// 构建完整的应用路由
pub fn create_app(app_state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(routes::auth::router())
        .nest("/users", routes::users::router())
        .nest("/articles", routes::articles::router())
        .nest("/comments", routes::comments::router())
        .nest("/tags", routes::tags::router())
        .nest("/bookmarks", routes::bookmarks::router());

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(cors_layer(&app_state.config.cors_allowed_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn cors_layer(allowed_origins: &str) -> CorsLayer {
    let origins = allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_origin(origins)
}

async fn health_check() -> &'static str {
    "Blog platform is running!"
}
