use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTagRequest {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(length(max = 200))]
    pub description: Option<String>,
    /// 省略时由名称生成
    #[validate(custom = "crate::utils::validation::validate_tag_slug")]
    pub slug: Option<String>,
}

/// 文章中嵌入的标签
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSummary {
    pub id: String,
    pub name: String,
    pub slug: String,
}

impl From<&Tag> for TagSummary {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id.clone(),
            name: tag.name.clone(),
            slug: tag.slug.clone(),
        }
    }
}

/// 带已发布文章数的标签
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: Tag,
    pub articles_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagQuery {
    pub search: Option<String>,
    pub ordering: Option<String>, // name, created_at, articles_count
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}
