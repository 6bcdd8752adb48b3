use crate::{
    config::Config,
    error::{AppError, Result},
    models::{
        article::*,
        response::{PageRequest, Paginated},
        tag::TagSummary,
        user::User,
    },
    services::{
        database::{constraint, Database},
        permission::{can_view_article, Actor},
        query::{ArticleFilter, ArticleOrdering, SortField},
        tag::TagService,
        user::UserService,
    },
    utils::{
        html::{derive_excerpt, estimate_read_time, sanitize_html},
        slug,
    },
};
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

/// slug 被并发占用时的重试次数
const SLUG_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct ArticleService {
    db: Database,
    tags: TagService,
    users: UserService,
    highlight_limit: usize,
    trending_window: Duration,
}

impl ArticleService {
    pub fn new(db: Database, tags: TagService, users: UserService, config: &Config) -> Self {
        Self {
            db,
            tags,
            users,
            highlight_limit: config.highlight_limit,
            trending_window: Duration::days(config.trending_window_days),
        }
    }

    /// 创建新文章
    pub async fn create_article(&self, author: &User, request: CreateArticleRequest) -> Result<Article> {
        debug!("Creating article for user: {}", author.id);

        // 校验原始输入，再做清洗
        request.validate()?;

        if self.db.title_exists(&request.title).await? {
            return Err(AppError::field(
                "title",
                "unique",
                "An article with this title already exists.",
            ));
        }

        let tags = self
            .tags
            .resolve_tags(request.tags.as_deref().unwrap_or_default())
            .await?;

        let content = sanitize_html(&request.content);
        let excerpt = match request.excerpt.filter(|e| !e.trim().is_empty()) {
            Some(excerpt) => excerpt,
            None => derive_excerpt(&content),
        };

        let now = Utc::now();
        let mut article = Article {
            id: Uuid::new_v4().to_string(),
            title: request.title,
            slug: String::new(),
            content,
            excerpt,
            featured_image: request.featured_image.filter(|f| !f.is_empty()),
            is_published: request.is_published.unwrap_or(true),
            published_at: now,
            updated_at: now,
            views_count: 0,
            author_id: author.id.clone(),
            tag_ids: tags.into_iter().map(|t| t.id).collect(),
        };

        self.insert_with_unique_slug(&mut article).await?;

        info!("Created article: {} ({})", article.slug, article.id);
        Ok(article)
    }

    /// 先读取已占用的后缀再插入；两个请求同时拿到同一个候选值时，
    /// 后插入者命中唯一约束并重新计算。
    async fn insert_with_unique_slug(&self, article: &mut Article) -> Result<()> {
        let base = slug::generate_slug(&article.title, slug::ARTICLE_SLUG_MAX);

        for _ in 0..SLUG_ATTEMPTS {
            let existing = self.db.slugs_with_base(&base).await?;
            article.slug = slug::next_available_slug(&base, &existing);

            match self.db.insert_article(article).await {
                Ok(()) => return Ok(()),
                Err(AppError::UniqueViolation(c)) if c == constraint::ARTICLE_SLUG => {
                    warn!("Slug {} claimed concurrently, retrying", article.slug);
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Conflict(
            "Could not allocate a unique slug, please retry".to_string(),
        ))
    }

    /// 更新文章；slug 创建后不再变化，标题唯一性不再检查
    pub async fn update_article(&self, mut article: Article, request: UpdateArticleRequest) -> Result<Article> {
        debug!("Updating article: {}", article.id);
        request.validate()?;

        if let Some(title) = request.title {
            article.title = title;
        }
        if let Some(content) = request.content {
            article.content = sanitize_html(&content);
        }
        if let Some(excerpt) = request.excerpt {
            article.excerpt = excerpt;
        }
        if article.excerpt.trim().is_empty() {
            article.excerpt = derive_excerpt(&article.content);
        }
        if let Some(featured_image) = request.featured_image {
            article.featured_image = Some(featured_image).filter(|f| !f.is_empty());
        }
        if let Some(is_published) = request.is_published {
            article.is_published = is_published;
        }
        if let Some(names) = request.tags {
            let tags = self.tags.resolve_tags(&names).await?;
            article.tag_ids = tags.into_iter().map(|t| t.id).collect();
        }
        article.updated_at = Utc::now();

        self.db.update_article(&article).await?;

        info!("Updated article: {}", article.id);
        Ok(article)
    }

    pub async fn delete_article(&self, article: &Article) -> Result<()> {
        if !self.db.delete_article(&article.id).await? {
            return Err(AppError::not_found("Article"));
        }
        info!("Deleted article: {}", article.id);
        Ok(())
    }

    /// 按 id 或 slug 查找对当前操作者可见的文章
    pub async fn get_visible(&self, actor: &Actor, key: &str) -> Result<Article> {
        let article = match self.db.get_article(key).await? {
            Some(article) => Some(article),
            None => self.db.find_article_by_slug(key).await?,
        };

        match article {
            Some(article) if can_view_article(actor, &article) => Ok(article),
            _ => Err(AppError::not_found("Article")),
        }
    }

    /// 原子增加浏览数，返回新值
    pub async fn increment_views(&self, article_id: &str) -> Result<u64> {
        self.db
            .increment_views(article_id)
            .await?
            .ok_or_else(|| AppError::not_found("Article"))
    }

    /// 文章详情，同时记一次浏览
    pub async fn retrieve(&self, actor: &Actor, key: &str) -> Result<ArticleDetail> {
        let mut article = self.get_visible(actor, key).await?;
        article.views_count = self.increment_views(&article.id).await?;
        self.detail(actor, article).await
    }

    pub async fn detail(&self, actor: &Actor, article: Article) -> Result<ArticleDetail> {
        let content = article.content.clone();
        let summary = self
            .to_list_items(actor, vec![article])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("Article"))?;
        Ok(ArticleDetail { summary, content })
    }

    pub async fn list_articles(
        &self,
        actor: &Actor,
        query: &ArticleQuery,
        page: PageRequest,
    ) -> Result<Paginated<ArticleListItem>> {
        debug!("Fetching articles list with query: {:?}", query);
        let filter = ArticleFilter::from_query(query, actor);
        self.list_filtered(actor, &filter, page).await
    }

    pub async fn list_by_author(
        &self,
        actor: &Actor,
        user_id: &str,
        page: PageRequest,
    ) -> Result<Paginated<ArticleListItem>> {
        self.users.get_user(user_id).await?;
        let filter = ArticleFilter {
            author_id: Some(user_id.to_string()),
            ..ArticleFilter::published()
        };
        self.list_filtered(actor, &filter, page).await
    }

    pub async fn list_by_tag(
        &self,
        actor: &Actor,
        tag_id: &str,
        page: PageRequest,
    ) -> Result<Paginated<ArticleListItem>> {
        self.tags.get_tag(tag_id).await?;
        let filter = ArticleFilter {
            tag_id: Some(tag_id.to_string()),
            ..ArticleFilter::published()
        };
        self.list_filtered(actor, &filter, page).await
    }

    async fn list_filtered(
        &self,
        actor: &Actor,
        filter: &ArticleFilter,
        page: PageRequest,
    ) -> Result<Paginated<ArticleListItem>> {
        let (articles, total) = self
            .db
            .list_articles(filter, page.offset(), page.limit())
            .await?;
        let items = self.to_list_items(actor, articles).await?;
        Ok(Paginated::new(items, total, page))
    }

    /// 浏览数最高的文章
    pub async fn popular(&self, actor: &Actor) -> Result<Vec<ArticleListItem>> {
        let filter = ArticleFilter::default()
            .visible_to(actor)
            .with_ordering(ArticleOrdering::by(SortField::ViewsCount, true));
        let (articles, _) = self
            .db
            .list_articles(&filter, 0, self.highlight_limit)
            .await?;
        self.to_list_items(actor, articles).await
    }

    /// 窗口期内点赞最多的文章，同票时新发布的在前
    pub async fn trending(&self, actor: &Actor) -> Result<Vec<TrendingItem>> {
        let filter = ArticleFilter::default().visible_to(actor);
        let since = Utc::now() - self.trending_window;
        let ranked = self
            .db
            .trending_articles(&filter, since, self.highlight_limit)
            .await?;

        let (articles, counts): (Vec<Article>, Vec<u64>) = ranked.into_iter().unzip();
        let items = self.to_list_items(actor, articles).await?;
        Ok(items
            .into_iter()
            .zip(counts)
            .map(|(article, recent_likes)| TrendingItem {
                article,
                recent_likes,
            })
            .collect())
    }

    /// 批量补充作者、标签、计数与当前用户的点赞/收藏状态
    pub async fn to_list_items(&self, actor: &Actor, articles: Vec<Article>) -> Result<Vec<ArticleListItem>> {
        if articles.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = articles.iter().map(|a| a.id.clone()).collect();
        let author_ids: Vec<String> = articles.iter().map(|a| a.author_id.clone()).collect();
        let mut tag_ids: Vec<String> = Vec::new();
        for id in articles.iter().flat_map(|a| a.tag_ids.iter()) {
            if !tag_ids.contains(id) {
                tag_ids.push(id.clone());
            }
        }

        let counts = self.db.article_counts(&ids).await?;
        let authors = self.users.author_summaries(&author_ids).await?;
        let tags: HashMap<String, TagSummary> = self
            .tags
            .summaries(&tag_ids)
            .await?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        let (liked, bookmarked) = match actor.user_id() {
            Some(user_id) => (
                self.db.liked_article_ids(user_id, &ids).await?,
                self.db.bookmarked_article_ids(user_id, &ids).await?,
            ),
            None => (HashSet::new(), HashSet::new()),
        };

        Ok(articles
            .into_iter()
            .filter_map(|article| {
                let author = authors.get(&article.author_id)?.clone();
                let counts = counts.get(&article.id).copied().unwrap_or_default();
                Some(ArticleListItem {
                    tags: article
                        .tag_ids
                        .iter()
                        .filter_map(|id| tags.get(id).cloned())
                        .collect(),
                    likes_count: counts.likes_count,
                    comments_count: counts.comments_count,
                    is_liked: liked.contains(&article.id),
                    is_bookmarked: bookmarked.contains(&article.id),
                    read_time: estimate_read_time(&article.content),
                    author,
                    id: article.id,
                    slug: article.slug,
                    title: article.title,
                    excerpt: article.excerpt,
                    featured_image: article.featured_image,
                    published_at: article.published_at,
                    updated_at: article.updated_at,
                    views_count: article.views_count,
                    is_published: article.is_published,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::RegisterRequest;
    use crate::services::{auth::Argon2Hasher, database::memory::MemoryStore};
    use crate::utils::validation::MAX_TAGS_PER_ARTICLE;
    use futures::future::join_all;
    use std::sync::Arc;

    struct Fixture {
        articles: ArticleService,
        users: UserService,
        db: Database,
    }

    fn fixture() -> Fixture {
        let db: Database = Arc::new(MemoryStore::new());
        let users = UserService::new(db.clone(), Arc::new(Argon2Hasher));
        let tags = TagService::new(db.clone());
        let articles = ArticleService::new(db.clone(), tags, users.clone(), &Config::default());
        Fixture { articles, users, db }
    }

    async fn register(users: &UserService, name: &str, staff: bool) -> User {
        users
            .register(RegisterRequest {
                username: name.to_string(),
                email: format!("{}@x.com", name),
                password: "Str0ng!Pass".to_string(),
                password_confirm: "Str0ng!Pass".to_string(),
                first_name: name.to_string(),
                last_name: "Tester".to_string(),
            })
            .await
            .unwrap();
        users.set_staff(name, staff).await.unwrap()
    }

    fn request(title: &str) -> CreateArticleRequest {
        CreateArticleRequest {
            title: title.to_string(),
            content: "<p>Enough content to pass validation.</p>".to_string(),
            excerpt: None,
            featured_image: None,
            tags: None,
            is_published: None,
        }
    }

    #[tokio::test]
    async fn test_slug_suffix_exceeds_existing() {
        let f = fixture();
        let alice = register(&f.users, "alice", true).await;

        let first = f.articles.create_article(&alice, request("Hello World")).await.unwrap();
        let second = f.articles.create_article(&alice, request("Hello, World!")).await.unwrap();
        let third = f.articles.create_article(&alice, request("hello world?")).await.unwrap();

        assert_eq!(first.slug, "hello-world");
        assert_eq!(second.slug, "hello-world-1");
        assert_eq!(third.slug, "hello-world-2");
    }

    #[tokio::test]
    async fn test_slug_not_recomputed_on_update() {
        let f = fixture();
        let alice = register(&f.users, "alice", true).await;
        let article = f.articles.create_article(&alice, request("Intro")).await.unwrap();

        let updated = f
            .articles
            .update_article(
                article.clone(),
                UpdateArticleRequest {
                    title: Some("Intro 2".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Intro 2");
        assert_eq!(updated.slug, "intro");
        assert_eq!(f.db.get_article(&article.id).await.unwrap().unwrap().slug, "intro");
    }

    #[tokio::test]
    async fn test_duplicate_title_rejected_on_create_only() {
        let f = fixture();
        let alice = register(&f.users, "alice", true).await;
        let intro = f.articles.create_article(&alice, request("Intro")).await.unwrap();
        let other = f.articles.create_article(&alice, request("Other")).await.unwrap();

        let err = f.articles.create_article(&alice, request("INTRO")).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);

        // 更新时允许与其他文章同名
        let renamed = f
            .articles
            .update_article(
                other,
                UpdateArticleRequest {
                    title: Some(intro.title.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.title, "Intro");
    }

    #[tokio::test]
    async fn test_content_is_sanitized_and_excerpt_derived() {
        let f = fixture();
        let alice = register(&f.users, "alice", true).await;

        let mut req = request("Long one");
        req.content = format!("<p>{}</p><script>alert(1)</script>", "x".repeat(400));
        let article = f.articles.create_article(&alice, req).await.unwrap();

        assert!(!article.content.contains("<script>"));
        assert!(article.excerpt.ends_with("..."));
        assert_eq!(article.excerpt.chars().count(), 300);

        let short = f.articles.create_article(&alice, request("Short one")).await.unwrap();
        assert_eq!(short.excerpt, "");
    }

    #[tokio::test]
    async fn test_tags_are_replaced_on_update() {
        let f = fixture();
        let alice = register(&f.users, "alice", true).await;

        let mut req = request("Tagged");
        req.tags = Some(vec!["Rust".to_string(), " web ".to_string()]);
        let article = f.articles.create_article(&alice, req).await.unwrap();
        assert_eq!(article.tag_ids.len(), 2);

        let updated = f
            .articles
            .update_article(
                article,
                UpdateArticleRequest {
                    tags: Some(vec!["go".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let detail = f
            .articles
            .detail(&Actor::Anonymous, updated)
            .await
            .unwrap();
        let names: Vec<&str> = detail.summary.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["go"]);
    }

    #[tokio::test]
    async fn test_too_many_tags_rejected() {
        let f = fixture();
        let alice = register(&f.users, "alice", true).await;
        let mut req = request("Tag soup");
        req.tags = Some((0..=MAX_TAGS_PER_ARTICLE).map(|i| format!("t{}", i)).collect());
        assert!(f.articles.create_article(&alice, req).await.is_err());
    }

    #[tokio::test]
    async fn test_non_staff_never_sees_drafts() {
        let f = fixture();
        let staff = register(&f.users, "admin", true).await;
        let bob = register(&f.users, "bob", false).await;

        let mut draft = request("Secret draft");
        draft.is_published = Some(false);
        let draft = f.articles.create_article(&staff, draft).await.unwrap();
        f.articles.create_article(&staff, request("Public post")).await.unwrap();

        for query in [
            ArticleQuery::default(),
            ArticleQuery { is_published: Some(false), ..Default::default() },
            ArticleQuery { search: Some("secret".to_string()), ..Default::default() },
            ArticleQuery { ordering: Some("-views_count".to_string()), ..Default::default() },
        ] {
            for actor in [Actor::Anonymous, Actor::User(bob.clone())] {
                let page = f
                    .articles
                    .list_articles(&actor, &query, PageRequest::new(None, None, 10, 100))
                    .await
                    .unwrap();
                assert!(page.results.iter().all(|a| a.is_published));
            }
        }

        assert!(f.articles.get_visible(&Actor::User(bob), &draft.slug).await.is_err());
        let staff_view = f
            .articles
            .get_visible(&Actor::User(staff), &draft.slug)
            .await
            .unwrap();
        assert_eq!(staff_view.id, draft.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_view_increments_are_not_lost() {
        let f = fixture();
        let alice = register(&f.users, "alice", true).await;
        let article = f.articles.create_article(&alice, request("Popular")).await.unwrap();

        const N: u64 = 50;
        let results = join_all((0..N).map(|_| {
            let articles = f.articles.clone();
            let id = article.id.clone();
            tokio::spawn(async move { articles.increment_views(&id).await })
        }))
        .await;
        assert!(results.into_iter().all(|r| r.unwrap().is_ok()));

        let stored = f.db.get_article(&article.id).await.unwrap().unwrap();
        assert_eq!(stored.views_count, N);
    }

    #[tokio::test]
    async fn test_retrieve_counts_views_and_popular_orders_by_views() {
        let f = fixture();
        let alice = register(&f.users, "alice", true).await;
        let a = f.articles.create_article(&alice, request("First")).await.unwrap();
        let b = f.articles.create_article(&alice, request("Second")).await.unwrap();

        for _ in 0..3 {
            f.articles.retrieve(&Actor::Anonymous, &b.slug).await.unwrap();
        }
        let detail = f.articles.retrieve(&Actor::Anonymous, &a.id).await.unwrap();
        assert_eq!(detail.summary.views_count, 1);

        let popular = f.articles.popular(&Actor::Anonymous).await.unwrap();
        assert_eq!(popular[0].id, b.id);
        assert_eq!(popular[0].views_count, 3);
    }

    #[tokio::test]
    async fn test_trending_ranks_by_recent_likes() {
        let f = fixture();
        let alice = register(&f.users, "alice", true).await;
        let bob = register(&f.users, "bob", false).await;
        let a = f.articles.create_article(&alice, request("Liked")).await.unwrap();
        f.articles.create_article(&alice, request("Newer but unliked")).await.unwrap();

        f.db
            .insert_like(&crate::models::like::ArticleLike::new(&a.id, &bob.id))
            .await
            .unwrap();
        let mut old = crate::models::like::ArticleLike::new(&a.id, &alice.id);
        old.created_at = Utc::now() - Duration::days(30);
        f.db.insert_like(&old).await.unwrap();

        let trending = f.articles.trending(&Actor::Anonymous).await.unwrap();
        assert_eq!(trending[0].article.id, a.id);
        assert_eq!(trending[0].recent_likes, 1);
        assert_eq!(trending[0].article.likes_count, 2);
        assert_eq!(trending.len(), 2);
    }
}
