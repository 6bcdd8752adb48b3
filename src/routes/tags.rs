use crate::{
    error::Result,
    models::{response::PageQuery, tag::*},
    services::permission::{ensure, Action, Policy},
    state::AppState,
    utils::middleware::CurrentActor,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tags).post(create_tag))
        .route("/:id", get(get_tag))
        .route("/:id/articles", get(get_tag_articles))
}

/// 标签列表，默认按文章数降序
/// GET /api/tags
pub async fn list_tags(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<TagQuery>,
) -> Result<Json<Value>> {
    let page = app_state.page(query.page, query.page_size);
    let tags = app_state.tag_service.list_tags(&query, page).await?;

    Ok(Json(json!({
        "success": true,
        "data": tags
    })))
}

/// 创建标签
/// POST /api/tags
pub async fn create_tag(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    ensure(&actor, Action::Create, Policy::StaffWrite, None)?;

    let tag = app_state.tag_service.create_tag(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": tag,
            "message": "Tag created successfully"
        })),
    ))
}

/// GET /api/tags/:id
pub async fn get_tag(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let tag = app_state.tag_service.tag_detail(&id).await?;

    Ok(Json(json!({
        "success": true,
        "data": tag
    })))
}

/// 标签下已发布的文章
/// GET /api/tags/:id/articles
pub async fn get_tag_articles(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>> {
    let page = app_state.page(query.page, query.page_size);
    let articles = app_state
        .article_service
        .list_by_tag(&actor, &id, page)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": articles
    })))
}
