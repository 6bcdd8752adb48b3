//! 持久化层
//!
//! 所有跨请求的协调都依赖存储层的约束：唯一索引、原子自增、级联删除。
//! 两个后端实现同一套语义：
//! - [`memory::MemoryStore`]：进程内存储，用于开发与测试
//! - [`surreal::SurrealStore`]：SurrealDB（HTTP 协议）

pub mod memory;
pub mod surreal;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

use crate::{
    config::Config,
    error::Result,
    models::{
        article::{Article, ArticleCounts},
        bookmark::Bookmark,
        comment::Comment,
        like::ArticleLike,
        tag::{Tag, TagWithCount},
        user::{Profile, User, UserChanges},
    },
    services::query::ArticleFilter,
};

/// 共享的存储句柄
pub type Database = Arc<dyn Store>;

/// 唯一约束名称，冲突时以 `AppError::UniqueViolation(name)` 返回
pub mod constraint {
    pub const USERNAME: &str = "username";
    pub const EMAIL: &str = "email";
    pub const PROFILE_USER: &str = "profile_user";
    pub const TAG_NAME: &str = "tag_name";
    pub const TAG_SLUG: &str = "tag_slug";
    pub const ARTICLE_SLUG: &str = "article_slug";
    pub const LIKE_PAIR: &str = "like_article_user";
    pub const BOOKMARK_PAIR: &str = "bookmark_article_user";
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn verify_connection(&self) -> Result<()>;

    // ---- users ----
    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, id: &str) -> Result<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    /// 只写入给出的字段，返回更新后的记录；用户不存在时返回 None
    async fn update_user_fields(&self, id: &str, changes: &UserChanges) -> Result<Option<User>>;
    /// 按用户名排序；`search` 匹配用户名与姓名（不区分大小写）
    async fn list_users(
        &self,
        search: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<User>, usize)>;
    /// 级联删除其文章、评论、点赞、收藏与资料
    async fn delete_user(&self, id: &str) -> Result<bool>;
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>>;
    async fn insert_profile(&self, profile: &Profile) -> Result<()>;
    async fn update_profile(&self, profile: &Profile) -> Result<()>;
    async fn count_articles_by_author(&self, user_id: &str) -> Result<u64>;
    async fn count_comments_by_user(&self, user_id: &str) -> Result<u64>;

    // ---- tags ----
    async fn insert_tag(&self, tag: &Tag) -> Result<()>;
    async fn get_tag(&self, id: &str) -> Result<Option<Tag>>;
    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>>;
    async fn get_tags(&self, ids: &[String]) -> Result<Vec<Tag>>;
    /// 带已发布文章数；`search` 匹配名称与描述
    async fn list_tags_with_counts(&self, search: Option<&str>) -> Result<Vec<TagWithCount>>;
    async fn count_published_with_tag(&self, tag_id: &str) -> Result<u64>;

    // ---- articles ----
    async fn insert_article(&self, article: &Article) -> Result<()>;
    async fn get_article(&self, id: &str) -> Result<Option<Article>>;
    async fn find_article_by_slug(&self, slug: &str) -> Result<Option<Article>>;
    /// 按给定顺序返回存在的文章
    async fn get_articles(&self, ids: &[String]) -> Result<Vec<Article>>;
    /// 形如 `base` 或 `base-N` 的已占用 slug
    async fn slugs_with_base(&self, base: &str) -> Result<Vec<String>>;
    async fn title_exists(&self, title: &str) -> Result<bool>;
    /// 写回可编辑字段，`views_count` 与 `slug` 不受影响
    async fn update_article(&self, article: &Article) -> Result<()>;
    /// 级联删除评论、点赞、收藏
    async fn delete_article(&self, id: &str) -> Result<bool>;
    /// 原子加一，返回新值；文章不存在时返回 None
    async fn increment_views(&self, id: &str) -> Result<Option<u64>>;
    async fn list_articles(
        &self,
        filter: &ArticleFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Article>, usize)>;
    async fn article_counts(&self, ids: &[String]) -> Result<HashMap<String, ArticleCounts>>;
    /// 满足过滤条件的文章按 `since` 之后的点赞数倒序，同票时新发布的在前
    async fn trending_articles(
        &self,
        filter: &ArticleFilter,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(Article, u64)>>;

    // ---- comments ----
    async fn insert_comment(&self, comment: &Comment) -> Result<()>;
    async fn get_comment(&self, id: &str) -> Result<Option<Comment>>;
    async fn update_comment(&self, comment: &Comment) -> Result<()>;
    /// 级联删除回复
    async fn delete_comment(&self, id: &str) -> Result<bool>;
    /// 文章下的全部评论（含回复），新的在前
    async fn list_article_comments(&self, article_id: &str) -> Result<Vec<Comment>>;
    /// 新的在前；`published_only` 时只含已发布文章下的评论
    async fn list_comments(
        &self,
        published_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Comment>, usize)>;
    async fn count_replies(&self, ids: &[String]) -> Result<HashMap<String, u64>>;

    // ---- likes ----
    async fn insert_like(&self, like: &ArticleLike) -> Result<()>;
    async fn delete_like(&self, article_id: &str, user_id: &str) -> Result<bool>;
    async fn like_exists(&self, article_id: &str, user_id: &str) -> Result<bool>;
    /// 新的在前
    async fn list_likes(&self, article_id: &str) -> Result<Vec<ArticleLike>>;
    async fn liked_article_ids(&self, user_id: &str, article_ids: &[String]) -> Result<HashSet<String>>;

    // ---- bookmarks ----
    async fn insert_bookmark(&self, bookmark: &Bookmark) -> Result<()>;
    async fn delete_bookmark(&self, article_id: &str, user_id: &str) -> Result<bool>;
    async fn bookmark_exists(&self, article_id: &str, user_id: &str) -> Result<bool>;
    /// 新的在前；`published_only` 时跳过未发布文章
    async fn list_bookmarks(
        &self,
        user_id: &str,
        published_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Bookmark>, usize)>;
    async fn bookmarked_article_ids(
        &self,
        user_id: &str,
        article_ids: &[String],
    ) -> Result<HashSet<String>>;
}

/// 根据配置选择存储后端
pub async fn connect(config: &Config) -> Result<Database> {
    if config.uses_memory_store() {
        info!("Using in-process store");
        return Ok(Arc::new(memory::MemoryStore::new()));
    }

    info!("Initializing database connection to {}", config.database_url);
    let store = surreal::SurrealStore::connect(config).await?;
    store.verify_connection().await?;
    store.define_schema().await?;
    info!("Database connection established successfully");

    Ok(Arc::new(store))
}

/// 在内存中做分页切片
pub(crate) fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> (Vec<T>, usize) {
    let total = items.len();
    let page = items.into_iter().skip(offset).take(limit).collect();
    (page, total)
}
