use crate::{
    error::Result,
    models::{article::*, comment::CreateCommentRequest},
    services::permission::{ensure, Action, Policy},
    state::AppState,
    utils::middleware::CurrentActor,
};
use axum::{
    extract::{Path, Query, State},
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
        .route("/", get(list_articles).post(create_article))
        .route("/popular", get(get_popular_articles))
        .route("/trending", get(get_trending_articles))
        .route(
            "/:key",
            get(get_article)
                .put(replace_article)
                .patch(update_article)
                .delete(delete_article),
        )
        .route("/:key/like", post(toggle_like))
        .route("/:key/likes", get(list_likes))
        .route("/:key/bookmark", post(toggle_bookmark))
        .route("/:key/comments", get(list_comments).post(add_comment))
}

/// 获取文章列表
/// GET /api/articles
pub async fn list_articles(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ArticleQuery>,
) -> Result<Json<Value>> {
    let page = app_state.page(query.page, query.page_size);
    let result = app_state
        .article_service
        .list_articles(&actor, &query, page)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": result
    })))
}

/// 浏览量最高的文章
/// GET /api/articles/popular
pub async fn get_popular_articles(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Value>> {
    debug!("Fetching popular articles");
    let articles = app_state.article_service.popular(&actor).await?;

    Ok(Json(json!({
        "success": true,
        "data": articles
    })))
}

/// 近期点赞最多的文章
/// GET /api/articles/trending
pub async fn get_trending_articles(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Value>> {
    debug!("Fetching trending articles");
    let articles = app_state.article_service.trending(&actor).await?;

    Ok(Json(json!({
        "success": true,
        "data": articles
    })))
}

/// 根据 id 或 slug 获取文章详情，同时记一次浏览
/// GET /api/articles/:key
pub async fn get_article(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(key): Path<String>,
) -> Result<Json<Value>> {
    let detail = app_state.article_service.retrieve(&actor, &key).await?;

    Ok(Json(json!({
        "success": true,
        "data": detail
    })))
}

/// 创建文章
/// POST /api/articles
pub async fn create_article(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<CreateArticleRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    ensure(&actor, Action::Create, Policy::StaffWrite, None)?;
    let user = actor.require_user()?;

    let article = app_state.article_service.create_article(user, request).await?;
    let detail = app_state.article_service.detail(&actor, article).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": detail,
            "message": "Article created successfully"
        })),
    ))
}

/// 整体更新文章
/// PUT /api/articles/:key
pub async fn replace_article(
    state: State<Arc<AppState>>,
    actor: CurrentActor,
    key: Path<String>,
    Json(request): Json<CreateArticleRequest>,
) -> Result<Json<Value>> {
    update_article(state, actor, key, Json(request.into())).await
}

/// 部分更新文章
/// PATCH /api/articles/:key
pub async fn update_article(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(key): Path<String>,
    Json(request): Json<UpdateArticleRequest>,
) -> Result<Json<Value>> {
    let article = app_state.article_service.get_visible(&actor, &key).await?;
    ensure(&actor, Action::Update, Policy::StaffWrite, Some(&article))?;

    let article = app_state.article_service.update_article(article, request).await?;
    let detail = app_state.article_service.detail(&actor, article).await?;

    Ok(Json(json!({
        "success": true,
        "data": detail,
        "message": "Article updated successfully"
    })))
}

/// 删除文章
/// DELETE /api/articles/:key
pub async fn delete_article(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(key): Path<String>,
) -> Result<StatusCode> {
    let article = app_state.article_service.get_visible(&actor, &key).await?;
    ensure(&actor, Action::Delete, Policy::StaffWrite, Some(&article))?;

    app_state.article_service.delete_article(&article).await?;
    info!("Deleted article: {}", article.id);
    Ok(StatusCode::NO_CONTENT)
}

/// 点赞开关
/// POST /api/articles/:key/like
pub async fn toggle_like(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<Value>)> {
    let article = app_state.article_service.get_visible(&actor, &key).await?;
    ensure(&actor, Action::Toggle, Policy::AuthenticatedWrite, None)?;
    let user = actor.require_user()?;

    let state = app_state.like_service.toggle(&article.id, &user.id).await?;
    let (status, message) = if state.is_active() {
        (StatusCode::CREATED, "Article liked")
    } else {
        (StatusCode::OK, "Article unliked")
    };

    Ok((
        status,
        Json(json!({
            "success": true,
            "data": { "is_liked": state.is_active() },
            "message": message
        })),
    ))
}

/// 点赞用户列表
/// GET /api/articles/:key/likes
pub async fn list_likes(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(key): Path<String>,
) -> Result<Json<Value>> {
    let article = app_state.article_service.get_visible(&actor, &key).await?;
    let likes = app_state.like_service.likes(&article.id).await?;

    Ok(Json(json!({
        "success": true,
        "data": likes
    })))
}

/// 收藏开关
/// POST /api/articles/:key/bookmark
pub async fn toggle_bookmark(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<Value>)> {
    let article = app_state.article_service.get_visible(&actor, &key).await?;
    ensure(&actor, Action::Toggle, Policy::AuthenticatedWrite, None)?;
    let user = actor.require_user()?;

    let state = app_state.bookmark_service.toggle(&article.id, &user.id).await?;
    let (status, message) = if state.is_active() {
        (StatusCode::CREATED, "Article bookmarked")
    } else {
        (StatusCode::OK, "Bookmark removed")
    };

    Ok((
        status,
        Json(json!({
            "success": true,
            "data": { "is_bookmarked": state.is_active() },
            "message": message
        })),
    ))
}

/// 文章评论（顶层 + 一层回复）
/// GET /api/articles/:key/comments
pub async fn list_comments(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(key): Path<String>,
) -> Result<Json<Value>> {
    let article = app_state.article_service.get_visible(&actor, &key).await?;
    let thread = app_state.comment_service.thread(&article.id).await?;

    Ok(Json(json!({
        "success": true,
        "data": thread
    })))
}

/// 发表评论
/// POST /api/articles/:key/comments
pub async fn add_comment(
    State(app_state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(key): Path<String>,
    Json(request): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let article = app_state.article_service.get_visible(&actor, &key).await?;
    ensure(&actor, Action::Create, Policy::AuthenticatedWrite, None)?;
    let user = actor.require_user()?;

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
