use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::tag::TagSummary;
use super::user::AuthorSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub featured_image: Option<String>,
    pub is_published: bool,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub views_count: u64,
    pub author_id: String,
    pub tag_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateArticleRequest {
    #[validate(length(min = 3, max = 200, message = "Title must be at least 3 characters long"))]
    pub title: String,

    #[validate(length(min = 10, message = "Content must be at least 10 characters long"))]
    pub content: String,

    #[validate(length(max = 300))]
    pub excerpt: Option<String>,

    #[validate(length(max = 500))]
    pub featured_image: Option<String>,

    #[validate(custom = "crate::utils::validation::validate_tag_names")]
    pub tags: Option<Vec<String>>,

    pub is_published: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateArticleRequest {
    #[validate(length(min = 3, max = 200, message = "Title must be at least 3 characters long"))]
    pub title: Option<String>,

    #[validate(length(min = 10, message = "Content must be at least 10 characters long"))]
    pub content: Option<String>,

    #[validate(length(max = 300))]
    pub excerpt: Option<String>,

    #[validate(length(max = 500))]
    pub featured_image: Option<String>,

    #[validate(custom = "crate::utils::validation::validate_tag_names")]
    pub tags: Option<Vec<String>>,

    pub is_published: Option<bool>,
}

/// 文章列表查询参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub tags: Option<String>,
    pub published_after: Option<DateTime<Utc>>,
    pub published_before: Option<DateTime<Utc>>,
    pub min_views: Option<u64>,
    pub is_published: Option<bool>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

/// 按文章聚合的计数，查询时统计而非存储
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleCounts {
    pub likes_count: u64,
    pub comments_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleListItem {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub featured_image: Option<String>,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: AuthorSummary,
    pub tags: Vec<TagSummary>,
    pub views_count: u64,
    pub likes_count: u64,
    pub comments_count: u64,
    pub is_liked: bool,
    pub is_bookmarked: bool,
    pub read_time: u32,
    pub is_published: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub summary: ArticleListItem,
    pub content: String,
}

/// 热门趋势条目：窗口期内的点赞数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingItem {
    #[serde(flatten)]
    pub article: ArticleListItem,
    pub recent_likes: u64,
}

/// PUT 使用完整载荷，转换为逐字段更新
impl From<CreateArticleRequest> for UpdateArticleRequest {
    fn from(request: CreateArticleRequest) -> Self {
        Self {
            title: Some(request.title),
            content: Some(request.content),
            excerpt: request.excerpt,
            featured_image: request.featured_image,
            tags: request.tags,
            is_published: request.is_published,
        }
    }
}
