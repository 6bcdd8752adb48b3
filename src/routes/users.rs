use crate::{
    error::Result,
    models::{
        response::{PageQuery, PageRequest},
        user::UserListQuery,
    },
    state::AppState,
    utils::middleware::CurrentActor,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users))
        .route("/:id", get(get_user))
        .route("/:id/articles", get(get_user_articles))
}

/// 用户列表
/// GET /api/users
pub async fn list_users(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Value>> {
    let page: PageRequest = app_state.page(query.page, query.page_size);
    let users = app_state.user_service.list_users(&query, page).await?;

    Ok(Json(json!({
        "success": true,
        "data": users
    })))
}

/// 用户详情
/// GET /api/users/:id
pub async fn get_user(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let user = app_state.user_service.get_user(&id).await?;
    let detail = app_state.user_service.user_detail(&user).await?;

    Ok(Json(json!({
        "success": true,
        "data": detail
    })))
}

/// 用户已发布的文章
/// GET /api/users/:id/articles
pub async fn get_user_articles(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>> {
    let page = app_state.page(query.page, query.page_size);
    let articles = app_state
        .article_service
        .list_by_author(&actor, &id, page)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": articles
    })))
}
