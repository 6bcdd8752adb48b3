use crate::{
    error::Result,
    models::bookmark::BookmarkQuery,
    services::permission::Actor,
    state::AppState,
    utils::middleware::AuthUser,
};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_bookmarks))
}

/// 当前用户的收藏列表
/// GET /api/bookmarks
pub async fn get_bookmarks(
    State(app_state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<BookmarkQuery>,
) -> Result<Json<Value>> {
    let page = app_state.page(query.page, query.page_size);
    let user_id = user.id.clone();
    let actor = Actor::User(user);

    let bookmarks = app_state
        .bookmark_service
        .list_bookmarks(&actor, &user_id, page)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": bookmarks
    })))
}
