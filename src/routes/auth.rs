use crate::{
    error::Result,
    models::user::*,
    state::AppState,
    utils::middleware::AuthUser,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/token", post(obtain_token))
        .route("/token/refresh", post(refresh_token))
        .route(
            "/me",
            get(get_current_user)
                .put(update_current_user)
                .patch(update_current_user)
                .delete(delete_current_user),
        )
        .route("/change-password", post(change_password))
}

/// 注册
/// POST /api/register
pub async fn register(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let user = app_state.user_service.register(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": UserSummary::from(&user),
            "message": "User registered successfully"
        })),
    ))
}

/// 用户名密码换取令牌
/// POST /api/token
pub async fn obtain_token(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>> {
    let tokens = app_state.auth_service.login(request).await?;

    Ok(Json(json!({
        "success": true,
        "data": tokens
    })))
}

/// 刷新访问令牌
/// POST /api/token/refresh
pub async fn refresh_token(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<Value>> {
    let tokens = app_state.auth_service.refresh(request).await?;

    Ok(Json(json!({
        "success": true,
        "data": tokens
    })))
}

/// 获取当前用户信息
/// GET /api/me
pub async fn get_current_user(
    State(app_state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>> {
    debug!("Getting current user info for user: {}", user.id);
    let detail = app_state.user_service.user_detail(&user).await?;

    Ok(Json(json!({
        "success": true,
        "data": detail
    })))
}

/// 更新当前用户及其资料
/// PUT/PATCH /api/me
pub async fn update_current_user(
    State(app_state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Value>> {
    let detail = app_state.user_service.update_profile(&user, request).await?;

    Ok(Json(json!({
        "success": true,
        "data": detail,
        "message": "Profile updated successfully"
    })))
}

/// 删除当前账号及其所有内容
/// DELETE /api/me
pub async fn delete_current_user(
    State(app_state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<StatusCode> {
    app_state.user_service.delete_account(&user).await?;
    info!("Account {} deleted by its owner", user.id);
    Ok(StatusCode::NO_CONTENT)
}

/// 修改密码
/// POST /api/change-password
pub async fn change_password(
    State(app_state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<Value>> {
    app_state.user_service.change_password(&user, request).await?;

    Ok(Json(json!({
        "success": true,
        "data": null,
        "message": "Password updated successfully"
    })))
}
