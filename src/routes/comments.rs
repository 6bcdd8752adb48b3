use crate::{
    error::{AppError, Result},
    models::comment::*,
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
use tracing::info;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_comments).post(create_comment))
        .route(
            "/:id",
            get(get_comment)
                .put(update_comment)
                .patch(update_comment)
                .delete(delete_comment),
        )
}

/// 全部评论，新的在前
/// GET /api/comments
pub async fn list_comments(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<CommentQuery>,
) -> Result<Json<Value>> {
    let page = app_state.page(query.page, query.page_size);
    let comments = app_state.comment_service.list_comments(&actor, page).await?;

    Ok(Json(json!({
        "success": true,
        "data": comments
    })))
}

/// 创建评论，文章由请求体给出
/// POST /api/comments
pub async fn create_comment(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    ensure(&actor, Action::Create, Policy::AuthenticatedWrite, None)?;
    let user = actor.require_user()?;

    let article_key = request
        .article
        .clone()
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| AppError::field("article", "required", "This field is required."))?;

    let article = app_state
        .article_service
        .get_visible(&actor, &article_key)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => {
                AppError::field("article", "does_not_exist", "Article does not exist.")
            }
            other => other,
        })?;

    let comment = app_state
        .comment_service
        .create_comment(&article.id, user, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": comment
        })),
    ))
}

/// 获取单条评论
/// GET /api/comments/:id
pub async fn get_comment(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let comment = app_state.comment_service.comment_detail(&actor, &id).await?;

    Ok(Json(json!({
        "success": true,
        "data": comment
    })))
}

/// 编辑评论，仅作者或管理员
/// PUT/PATCH /api/comments/:id
pub async fn update_comment(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(request): Json<UpdateCommentRequest>,
) -> Result<Json<Value>> {
    let comment = app_state.comment_service.visible_comment(&actor, &id).await?;
    ensure(&actor, Action::Update, Policy::OwnerOrStaffWrite, Some(&comment))?;

    let comment = app_state.comment_service.update_comment(comment, request).await?;

    Ok(Json(json!({
        "success": true,
        "data": comment,
        "message": "Comment updated successfully"
    })))
}

/// 删除评论及其回复
/// DELETE /api/comments/:id
pub async fn delete_comment(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let comment = app_state.comment_service.visible_comment(&actor, &id).await?;
    ensure(&actor, Action::Delete, Policy::OwnerOrStaffWrite, Some(&comment))?;

    app_state.comment_service.delete_comment(&comment).await?;
    info!("Deleted comment: {}", comment.id);
    Ok(StatusCode::NO_CONTENT)
}
