use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::article::ArticleListItem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub user_id: String,
    pub article_id: String,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn new(article_id: &str, user_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            article_id: article_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkWithArticle {
    pub id: String,
    pub article: ArticleListItem,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Default)]
pub struct BookmarkQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}
