use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::user::AuthorSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub article_id: String,
    pub user_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCommentRequest {
    /// 通过 `/comments` 创建时必填，文章子路由下由路径提供
    pub article: Option<String>,
    #[validate(length(min = 2, message = "Comment must be at least 2 characters long"))]
    pub content: String,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 2, message = "Comment must be at least 2 characters long"))]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: String,
    pub article: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: AuthorSummary,
    pub parent: Option<String>,
    pub is_edited: bool,
    pub replies_count: u64,
}

/// 顶层评论及其一层回复
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: CommentResponse,
    pub replies: Vec<CommentResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}
