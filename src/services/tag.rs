use crate::{
    error::{AppError, Result},
    models::{
        response::{PageRequest, Paginated},
        tag::*,
    },
    services::database::{constraint, Database},
    utils::{
        slug,
        validation::{normalize_tag_name, MAX_TAGS_PER_ARTICLE},
    },
};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

/// slug 冲突时的最大重试次数
const SLUG_ATTEMPTS: u64 = 5;

#[derive(Clone)]
pub struct TagService {
    db: Database,
}

impl TagService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create_tag(&self, request: CreateTagRequest) -> Result<Tag> {
        debug!("Creating tag: {}", request.name);
        request.validate()?;

        let name = normalize_tag_name(&request.name)
            .ok_or_else(|| AppError::field("name", "blank", "This field may not be blank."))?;

        if self.db.find_tag_by_name(&name).await?.is_some() {
            return Err(AppError::Conflict(format!("Tag '{}' already exists", name)));
        }

        let description = request.description.unwrap_or_default();
        let created = match request.slug {
            Some(slug) => self.insert_tag(&name, slug, description).await,
            None => self.insert_with_slug(&name, description).await,
        };
        match created {
            Err(AppError::UniqueViolation(c)) if c == constraint::TAG_NAME => {
                Err(AppError::Conflict(format!("Tag '{}' already exists", name)))
            }
            Err(AppError::UniqueViolation(c)) if c == constraint::TAG_SLUG => Err(AppError::field(
                "slug",
                "unique",
                "tag with this slug already exists.",
            )),
            other => other,
        }
    }

    /// 按名称获取标签，不存在则创建；并发创建时重新读取
    pub async fn get_or_create(&self, name: &str) -> Result<Tag> {
        if let Some(tag) = self.db.find_tag_by_name(name).await? {
            return Ok(tag);
        }

        match self.insert_with_slug(name, String::new()).await {
            Ok(tag) => Ok(tag),
            Err(AppError::UniqueViolation(c)) if c == constraint::TAG_NAME => {
                warn!("Tag {} created concurrently, re-fetching", name);
                self.db
                    .find_tag_by_name(name)
                    .await?
                    .ok_or_else(|| AppError::internal("Tag vanished after conflict"))
            }
            Err(e) => Err(e),
        }
    }

    /// 规范化并解析文章的标签集合：去重、忽略空名、最多 10 个
    pub async fn resolve_tags(&self, names: &[String]) -> Result<Vec<Tag>> {
        let mut normalized: Vec<String> = Vec::new();
        for name in names.iter().filter_map(|n| normalize_tag_name(n)) {
            if !normalized.contains(&name) {
                normalized.push(name);
            }
        }

        if normalized.len() > MAX_TAGS_PER_ARTICLE {
            return Err(AppError::field(
                "tags",
                "max_tags",
                format!("Maximum {} tags allowed", MAX_TAGS_PER_ARTICLE),
            ));
        }

        let mut tags = Vec::with_capacity(normalized.len());
        for name in &normalized {
            tags.push(self.get_or_create(name).await?);
        }
        Ok(tags)
    }

    async fn insert_with_slug(&self, name: &str, description: String) -> Result<Tag> {
        let base = slug::generate_slug(name, slug::TAG_SLUG_MAX);

        for attempt in 0..SLUG_ATTEMPTS {
            let candidate = if attempt == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, attempt)
            };
            match self.insert_tag(name, candidate.clone(), description.clone()).await {
                Err(AppError::UniqueViolation(c)) if c == constraint::TAG_SLUG => {
                    debug!("Tag slug {} taken, retrying", candidate);
                }
                other => return other,
            }
        }

        Err(AppError::Conflict(format!(
            "Could not allocate a slug for tag '{}'",
            name
        )))
    }

    async fn insert_tag(&self, name: &str, slug: String, description: String) -> Result<Tag> {
        let tag = Tag {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            slug,
            description,
            created_at: Utc::now(),
        };
        self.db.insert_tag(&tag).await?;
        info!("Created tag: {} ({})", tag.name, tag.id);
        Ok(tag)
    }

    pub async fn get_tag(&self, id: &str) -> Result<Tag> {
        self.db
            .get_tag(id)
            .await?
            .ok_or_else(|| AppError::not_found("Tag"))
    }

    pub async fn tag_detail(&self, id: &str) -> Result<TagWithCount> {
        let tag = self.get_tag(id).await?;
        let articles_count = self.db.count_published_with_tag(&tag.id).await?;
        Ok(TagWithCount { tag, articles_count })
    }

    /// 默认按已发布文章数倒序
    pub async fn list_tags(&self, query: &TagQuery, page: PageRequest) -> Result<Paginated<TagWithCount>> {
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let mut tags = self.db.list_tags_with_counts(search).await?;

        let ordering = query.ordering.as_deref().unwrap_or("-articles_count");
        let (descending, field) = match ordering.strip_prefix('-') {
            Some(field) => (true, field),
            None => (false, ordering),
        };
        tags.sort_by(|a, b| {
            let ord = match field {
                "name" => a.tag.name.cmp(&b.tag.name),
                "created_at" => a.tag.created_at.cmp(&b.tag.created_at),
                _ => a
                    .articles_count
                    .cmp(&b.articles_count)
                    .then_with(|| b.tag.name.cmp(&a.tag.name)),
            };
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });

        let count = tags.len();
        let results = tags
            .into_iter()
            .skip(page.offset())
            .take(page.limit())
            .collect();
        Ok(Paginated::new(results, count, page))
    }

    pub async fn summaries(&self, ids: &[String]) -> Result<Vec<TagSummary>> {
        Ok(self
            .db
            .get_tags(ids)
            .await?
            .iter()
            .map(TagSummary::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::memory::MemoryStore;
    use futures::future::join_all;
    use std::sync::Arc;

    fn service() -> TagService {
        TagService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_resolve_normalizes_and_dedupes() {
        let tags = service();
        let resolved = tags
            .resolve_tags(&[
                " Rust ".to_string(),
                "rust".to_string(),
                "".to_string(),
                "Web Dev".to_string(),
            ])
            .await
            .unwrap();

        let names: Vec<&str> = resolved.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["rust", "web dev"]);
        assert_eq!(resolved[1].slug, "web-dev");

        // 再次解析复用已有标签
        let again = tags.resolve_tags(&["RUST".to_string()]).await.unwrap();
        assert_eq!(again[0].id, resolved[0].id);
    }

    #[tokio::test]
    async fn test_resolve_caps_at_ten() {
        let tags = service();
        let names: Vec<String> = (0..11).map(|i| format!("tag{}", i)).collect();
        let err = tags.resolve_tags(&names).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);

        let names: Vec<String> = (0..10).map(|i| format!("tag{}", i)).collect();
        assert_eq!(tags.resolve_tags(&names).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_slug_collision_between_names() {
        let tags = service();
        let plus = tags.get_or_create("c++").await.unwrap();
        let plain = tags.get_or_create("c").await.unwrap();
        assert_ne!(plus.slug, plain.slug);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_yields_one_tag() {
        let tags = service();
        let results = join_all((0..8).map(|_| {
            let tags = tags.clone();
            tokio::spawn(async move { tags.get_or_create("rust").await })
        }))
        .await;

        let ids: std::collections::HashSet<String> = results
            .into_iter()
            .map(|r| r.unwrap().unwrap().id)
            .collect();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_create_tag_conflict() {
        let tags = service();
        let request = CreateTagRequest {
            name: "Rust".to_string(),
            description: Some("Systems".to_string()),
            slug: None,
        };
        let tag = tags.create_tag(request.clone()).await.unwrap();
        assert_eq!(tag.name, "rust");
        assert_eq!(tag.description, "Systems");

        let err = tags.create_tag(request).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_create_tag_with_client_slug() {
        let tags = service();
        let tag = tags
            .create_tag(CreateTagRequest {
                name: "Rust".to_string(),
                description: None,
                slug: Some("rust-lang".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(tag.slug, "rust-lang");

        let taken = tags
            .create_tag(CreateTagRequest {
                name: "Ferris".to_string(),
                description: None,
                slug: Some("rust-lang".to_string()),
            })
            .await
            .unwrap_err();
        assert_eq!(taken.status(), axum::http::StatusCode::BAD_REQUEST);

        let invalid = tags
            .create_tag(CreateTagRequest {
                name: "Ferris".to_string(),
                description: None,
                slug: Some("Not A Slug".to_string()),
            })
            .await
            .unwrap_err();
        assert_eq!(invalid.status(), axum::http::StatusCode::BAD_REQUEST);

        // 未指定 slug 时仍由名称生成
        let generated = tags
            .create_tag(CreateTagRequest {
                name: "Ferris".to_string(),
                description: None,
                slug: None,
            })
            .await
            .unwrap();
        assert_eq!(generated.slug, "ferris");
    }

    #[tokio::test]
    async fn test_tag_detail_counts_published_articles() {
        let db: Database = Arc::new(MemoryStore::new());
        let tags = TagService::new(db.clone());
        let rust = tags.get_or_create("rust").await.unwrap();

        let detail = tags.tag_detail(&rust.id).await.unwrap();
        assert_eq!(detail.articles_count, 0);
        assert_eq!(db.count_published_with_tag(&rust.id).await.unwrap(), 0);
    }
}
