use crate::{
    error::AppError,
    models::user::User,
    services::permission::Actor,
    state::AppState,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, info};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// 认证中间件
///
/// 解析 Bearer 令牌并把 [`Actor`] 放入请求扩展。令牌缺失或无效时按匿名处理，
/// 需要登录的处理器自行返回 401。
pub async fn auth_middleware(
    State(app_state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let actor = match bearer_token(request.headers()) {
        Some(token) => match app_state.auth_service.authenticate(token).await {
            Ok(user) => {
                debug!("Authenticated user: {} ({})", user.username, user.id);
                Actor::User(user)
            }
            Err(e) => {
                debug!("Bearer token rejected: {}", e);
                Actor::Anonymous
            }
        },
        None => Actor::Anonymous,
    };

    request.extensions_mut().insert(actor);
    next.run(request).await
}

/// 请求日志中间件
pub async fn request_logging_middleware(request: Request<Body>, next: Next<Body>) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start_time = std::time::Instant::now();

    let response = next.run(request).await;

    info!(
        "Request completed: {} {} {} - {}ms",
        method,
        uri,
        response.status().as_u16(),
        start_time.elapsed().as_millis()
    );

    response
}

/// 当前操作者，未经认证中间件时视为匿名
pub struct CurrentActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentActor(
            parts
                .extensions
                .get::<Actor>()
                .cloned()
                .unwrap_or(Actor::Anonymous),
        ))
    }
}

/// 必须已登录的用户
pub struct AuthUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentActor(actor) = CurrentActor::from_request_parts(parts, state).await?;
        match actor {
            Actor::User(user) => Ok(AuthUser(user)),
            Actor::Anonymous => Err(AppError::unauthorized(
                "Authentication credentials were not provided.",
            )),
        }
    }
}
