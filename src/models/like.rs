use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::AuthorSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleLike {
    pub id: String,
    pub article_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl ArticleLike {
    pub fn new(article_id: &str, user_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            article_id: article_id.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeResponse {
    pub id: String,
    pub user: AuthorSummary,
    pub created_at: DateTime<Utc>,
}

/// 开关操作的结果：行存在即为 true
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    Added,
    Removed,
}

impl Toggle {
    pub fn is_active(self) -> bool {
        matches!(self, Toggle::Added)
    }
}
