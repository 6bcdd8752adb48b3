//! 文章列表的过滤、搜索与排序
//!
//! 内存存储直接调用 [`ArticleFilter::matches`] 与 [`ArticleOrdering::compare`]，
//! SurrealDB 存储则把同样的条件翻译成 SurrealQL。

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::models::article::{Article, ArticleQuery};
use crate::services::permission::Actor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    PublishedAt,
    Title,
    ViewsCount,
    UpdatedAt,
}

impl SortField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "published_at" => Some(SortField::PublishedAt),
            "title" => Some(SortField::Title),
            "views_count" => Some(SortField::ViewsCount),
            "updated_at" => Some(SortField::UpdatedAt),
            _ => None,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            SortField::PublishedAt => "published_at",
            SortField::Title => "title",
            SortField::ViewsCount => "views_count",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

/// 排序键列表，默认按发布时间倒序
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleOrdering(pub Vec<SortKey>);

impl Default for ArticleOrdering {
    fn default() -> Self {
        Self(vec![SortKey {
            field: SortField::PublishedAt,
            descending: true,
        }])
    }
}

impl ArticleOrdering {
    /// 解析 `-views_count,title` 形式的排序参数，未知字段忽略
    pub fn parse(raw: Option<&str>) -> Self {
        let keys: Vec<SortKey> = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|term| {
                let (descending, name) = match term.strip_prefix('-') {
                    Some(name) => (true, name),
                    None => (false, term),
                };
                SortField::parse(name).map(|field| SortKey { field, descending })
            })
            .collect();

        if keys.is_empty() {
            Self::default()
        } else {
            Self(keys)
        }
    }

    pub fn by(field: SortField, descending: bool) -> Self {
        Self(vec![SortKey { field, descending }])
    }

    pub fn compare(&self, a: &Article, b: &Article) -> Ordering {
        for key in &self.0 {
            let ord = match key.field {
                SortField::PublishedAt => a.published_at.cmp(&b.published_at),
                SortField::Title => a.title.cmp(&b.title),
                SortField::ViewsCount => a.views_count.cmp(&b.views_count),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// `ORDER BY` 子句（不含关键字）
    pub fn to_surql(&self) -> String {
        self.0
            .iter()
            .map(|key| {
                format!(
                    "{} {}",
                    key.field.column(),
                    if key.descending { "DESC" } else { "ASC" }
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// 文章过滤条件，字符串条件均已转为小写
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub title: Option<String>,
    pub author: Option<String>,
    pub author_id: Option<String>,
    pub tag: Option<String>,
    pub tag_id: Option<String>,
    pub published_after: Option<DateTime<Utc>>,
    pub published_before: Option<DateTime<Utc>>,
    pub min_views: Option<u64>,
    pub is_published: Option<bool>,
    /// 非 staff 强制只看已发布文章，与请求参数无关
    pub published_only: bool,
    pub search_terms: Vec<String>,
    pub ordering: ArticleOrdering,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

impl ArticleFilter {
    pub fn from_query(query: &ArticleQuery, actor: &Actor) -> Self {
        Self {
            title: non_blank(&query.title),
            author: non_blank(&query.author),
            tag: non_blank(&query.tags),
            published_after: query.published_after,
            published_before: query.published_before,
            min_views: query.min_views,
            is_published: query.is_published,
            search_terms: non_blank(&query.search)
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            ordering: ArticleOrdering::parse(query.ordering.as_deref()),
            ..Default::default()
        }
        .visible_to(actor)
    }

    /// 只包含已发布文章的过滤器
    pub fn published() -> Self {
        Self {
            published_only: true,
            ..Default::default()
        }
    }

    pub fn visible_to(mut self, actor: &Actor) -> Self {
        if !actor.is_staff() {
            self.published_only = true;
        }
        self
    }

    pub fn with_ordering(mut self, ordering: ArticleOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// `tag_names` 需为小写
    pub fn matches(&self, article: &Article, author_username: &str, tag_names: &[String]) -> bool {
        if self.published_only && !article.is_published {
            return false;
        }
        if let Some(flag) = self.is_published {
            if article.is_published != flag {
                return false;
            }
        }
        if let Some(title) = &self.title {
            if !article.title.to_lowercase().contains(title) {
                return false;
            }
        }
        if let Some(author) = &self.author {
            if !author_username.to_lowercase().contains(author) {
                return false;
            }
        }
        if let Some(author_id) = &self.author_id {
            if &article.author_id != author_id {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !tag_names.iter().any(|name| name == tag) {
                return false;
            }
        }
        if let Some(tag_id) = &self.tag_id {
            if !article.tag_ids.contains(tag_id) {
                return false;
            }
        }
        if let Some(after) = self.published_after {
            if article.published_at < after {
                return false;
            }
        }
        if let Some(before) = self.published_before {
            if article.published_at > before {
                return false;
            }
        }
        if let Some(min_views) = self.min_views {
            if article.views_count < min_views {
                return false;
            }
        }

        if !self.search_terms.is_empty() {
            let haystacks = [
                article.title.to_lowercase(),
                article.content.to_lowercase(),
                article.excerpt.to_lowercase(),
                author_username.to_lowercase(),
            ];
            // 每个词都需命中任一字段
            let all_terms_hit = self.search_terms.iter().all(|term| {
                haystacks.iter().any(|h| h.contains(term.as_str()))
                    || tag_names.iter().any(|name| name.contains(term.as_str()))
            });
            if !all_terms_hit {
                return false;
            }
        }

        true
    }
}
