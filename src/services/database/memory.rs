use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use super::{constraint, paginate, Store};
use crate::{
    error::{AppError, Result},
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

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    /// 以 user_id 为键
    profiles: HashMap<String, Profile>,
    tags: HashMap<String, Tag>,
    articles: HashMap<String, Article>,
    comments: HashMap<String, Comment>,
    likes: HashMap<String, ArticleLike>,
    bookmarks: HashMap<String, Bookmark>,
}

impl Tables {
    fn tag_names(&self, article: &Article) -> Vec<String> {
        article
            .tag_ids
            .iter()
            .filter_map(|id| self.tags.get(id))
            .map(|t| t.name.to_lowercase())
            .collect()
    }

    fn username_of(&self, user_id: &str) -> &str {
        self.users
            .get(user_id)
            .map(|u| u.username.as_str())
            .unwrap_or_default()
    }

    fn article_is_published(&self, article_id: &str) -> bool {
        self.articles
            .get(article_id)
            .map(|a| a.is_published)
            .unwrap_or(false)
    }

    fn remove_articles_cascade(&mut self, ids: &HashSet<String>) {
        self.articles.retain(|id, _| !ids.contains(id));
        self.comments.retain(|_, c| !ids.contains(&c.article_id));
        self.likes.retain(|_, l| !ids.contains(&l.article_id));
        self.bookmarks.retain(|_, b| !ids.contains(&b.article_id));
    }

    fn remove_comments_cascade(&mut self, ids: &HashSet<String>) {
        self.comments.retain(|id, c| {
            !ids.contains(id) && !c.parent_id.as_ref().map(|p| ids.contains(p)).unwrap_or(false)
        });
    }
}

/// 进程内存储
///
/// 每个操作在一次加锁内完成，唯一约束检查与写入不可分割。
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn verify_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut t = self.tables.write();
        if t.users.values().any(|u| u.username == user.username) {
            return Err(AppError::UniqueViolation(constraint::USERNAME.to_string()));
        }
        if t.users.values().any(|u| u.email == user.email) {
            return Err(AppError::UniqueViolation(constraint::EMAIL.to_string()));
        }
        t.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.tables.read().users.get(id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update_user_fields(&self, id: &str, changes: &UserChanges) -> Result<Option<User>> {
        let mut t = self.tables.write();
        if let Some(email) = &changes.email {
            if t.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(AppError::UniqueViolation(constraint::EMAIL.to_string()));
            }
        }
        Ok(t.users.get_mut(id).map(|user| {
            changes.apply(user);
            user.clone()
        }))
    }

    async fn list_users(
        &self,
        search: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<User>, usize)> {
        let t = self.tables.read();
        let needle = search.map(str::to_lowercase);
        let mut users: Vec<User> = t
            .users
            .values()
            .filter(|u| match &needle {
                Some(n) => {
                    u.username.to_lowercase().contains(n)
                        || u.first_name.to_lowercase().contains(n)
                        || u.last_name.to_lowercase().contains(n)
                }
                None => true,
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(paginate(users, offset, limit))
    }

    async fn delete_user(&self, id: &str) -> Result<bool> {
        let mut t = self.tables.write();
        if t.users.remove(id).is_none() {
            return Ok(false);
        }
        t.profiles.remove(id);

        let articles: HashSet<String> = t
            .articles
            .values()
            .filter(|a| a.author_id == id)
            .map(|a| a.id.clone())
            .collect();
        t.remove_articles_cascade(&articles);

        let comments: HashSet<String> = t
            .comments
            .values()
            .filter(|c| c.user_id == id)
            .map(|c| c.id.clone())
            .collect();
        t.remove_comments_cascade(&comments);

        t.likes.retain(|_, l| l.user_id != id);
        t.bookmarks.retain(|_, b| b.user_id != id);
        Ok(true)
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        Ok(self.tables.read().profiles.get(user_id).cloned())
    }

    async fn insert_profile(&self, profile: &Profile) -> Result<()> {
        let mut t = self.tables.write();
        if t.profiles.contains_key(&profile.user_id) {
            return Err(AppError::UniqueViolation(constraint::PROFILE_USER.to_string()));
        }
        t.profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn update_profile(&self, profile: &Profile) -> Result<()> {
        let mut t = self.tables.write();
        match t.profiles.get_mut(&profile.user_id) {
            Some(existing) => {
                *existing = profile.clone();
                Ok(())
            }
            None => Err(AppError::not_found("Profile")),
        }
    }

    async fn count_articles_by_author(&self, user_id: &str) -> Result<u64> {
        let t = self.tables.read();
        Ok(t.articles.values().filter(|a| a.author_id == user_id).count() as u64)
    }

    async fn count_comments_by_user(&self, user_id: &str) -> Result<u64> {
        let t = self.tables.read();
        Ok(t.comments.values().filter(|c| c.user_id == user_id).count() as u64)
    }

    async fn insert_tag(&self, tag: &Tag) -> Result<()> {
        let mut t = self.tables.write();
        if t.tags.values().any(|x| x.name == tag.name) {
            return Err(AppError::UniqueViolation(constraint::TAG_NAME.to_string()));
        }
        if t.tags.values().any(|x| x.slug == tag.slug) {
            return Err(AppError::UniqueViolation(constraint::TAG_SLUG.to_string()));
        }
        t.tags.insert(tag.id.clone(), tag.clone());
        Ok(())
    }

    async fn get_tag(&self, id: &str) -> Result<Option<Tag>> {
        Ok(self.tables.read().tags.get(id).cloned())
    }

    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        Ok(self
            .tables
            .read()
            .tags
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn get_tags(&self, ids: &[String]) -> Result<Vec<Tag>> {
        let t = self.tables.read();
        Ok(ids.iter().filter_map(|id| t.tags.get(id)).cloned().collect())
    }

    async fn list_tags_with_counts(&self, search: Option<&str>) -> Result<Vec<TagWithCount>> {
        let t = self.tables.read();
        let needle = search.map(str::to_lowercase);

        let mut counts: HashMap<&str, u64> = HashMap::new();
        for article in t.articles.values().filter(|a| a.is_published) {
            for tag_id in &article.tag_ids {
                *counts.entry(tag_id.as_str()).or_default() += 1;
            }
        }

        Ok(t.tags
            .values()
            .filter(|tag| match &needle {
                Some(n) => {
                    tag.name.to_lowercase().contains(n)
                        || tag.description.to_lowercase().contains(n)
                }
                None => true,
            })
            .map(|tag| TagWithCount {
                articles_count: counts.get(tag.id.as_str()).copied().unwrap_or(0),
                tag: tag.clone(),
            })
            .collect())
    }

    async fn count_published_with_tag(&self, tag_id: &str) -> Result<u64> {
        let t = self.tables.read();
        Ok(t.articles
            .values()
            .filter(|a| a.is_published && a.tag_ids.iter().any(|id| id == tag_id))
            .count() as u64)
    }

    async fn insert_article(&self, article: &Article) -> Result<()> {
        let mut t = self.tables.write();
        if t.articles.values().any(|a| a.slug == article.slug) {
            return Err(AppError::UniqueViolation(constraint::ARTICLE_SLUG.to_string()));
        }
        t.articles.insert(article.id.clone(), article.clone());
        Ok(())
    }

    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        Ok(self.tables.read().articles.get(id).cloned())
    }

    async fn find_article_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        Ok(self
            .tables
            .read()
            .articles
            .values()
            .find(|a| a.slug == slug)
            .cloned())
    }

    async fn get_articles(&self, ids: &[String]) -> Result<Vec<Article>> {
        let t = self.tables.read();
        Ok(ids.iter().filter_map(|id| t.articles.get(id)).cloned().collect())
    }

    async fn slugs_with_base(&self, base: &str) -> Result<Vec<String>> {
        let prefix = format!("{}-", base);
        Ok(self
            .tables
            .read()
            .articles
            .values()
            .filter(|a| a.slug == base || a.slug.starts_with(&prefix))
            .map(|a| a.slug.clone())
            .collect())
    }

    async fn title_exists(&self, title: &str) -> Result<bool> {
        let title = title.to_lowercase();
        Ok(self
            .tables
            .read()
            .articles
            .values()
            .any(|a| a.title.to_lowercase() == title))
    }

    async fn update_article(&self, article: &Article) -> Result<()> {
        let mut t = self.tables.write();
        let existing = t
            .articles
            .get_mut(&article.id)
            .ok_or_else(|| AppError::not_found("Article"))?;

        existing.title = article.title.clone();
        existing.content = article.content.clone();
        existing.excerpt = article.excerpt.clone();
        existing.featured_image = article.featured_image.clone();
        existing.is_published = article.is_published;
        existing.updated_at = article.updated_at;
        existing.tag_ids = article.tag_ids.clone();
        Ok(())
    }

    async fn delete_article(&self, id: &str) -> Result<bool> {
        let mut t = self.tables.write();
        if !t.articles.contains_key(id) {
            return Ok(false);
        }
        let ids = HashSet::from([id.to_string()]);
        t.remove_articles_cascade(&ids);
        Ok(true)
    }

    async fn increment_views(&self, id: &str) -> Result<Option<u64>> {
        let mut t = self.tables.write();
        Ok(t.articles.get_mut(id).map(|a| {
            a.views_count += 1;
            a.views_count
        }))
    }

    async fn list_articles(
        &self,
        filter: &ArticleFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Article>, usize)> {
        let t = self.tables.read();
        let mut articles: Vec<Article> = t
            .articles
            .values()
            .filter(|a| filter.matches(a, t.username_of(&a.author_id), &t.tag_names(a)))
            .cloned()
            .collect();
        articles.sort_by(|a, b| filter.ordering.compare(a, b));
        Ok(paginate(articles, offset, limit))
    }

    async fn article_counts(&self, ids: &[String]) -> Result<HashMap<String, ArticleCounts>> {
        let t = self.tables.read();
        let mut counts: HashMap<String, ArticleCounts> = ids
            .iter()
            .map(|id| (id.clone(), ArticleCounts::default()))
            .collect();

        for like in t.likes.values() {
            if let Some(c) = counts.get_mut(&like.article_id) {
                c.likes_count += 1;
            }
        }
        for comment in t.comments.values() {
            if let Some(c) = counts.get_mut(&comment.article_id) {
                c.comments_count += 1;
            }
        }
        Ok(counts)
    }

    async fn trending_articles(
        &self,
        filter: &ArticleFilter,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(Article, u64)>> {
        let t = self.tables.read();
        let mut recent: HashMap<&str, u64> = HashMap::new();
        for like in t.likes.values().filter(|l| l.created_at >= since) {
            *recent.entry(like.article_id.as_str()).or_default() += 1;
        }

        let mut ranked: Vec<(Article, u64)> = t
            .articles
            .values()
            .filter(|a| filter.matches(a, t.username_of(&a.author_id), &t.tag_names(a)))
            .map(|a| (a.clone(), recent.get(a.id.as_str()).copied().unwrap_or(0)))
            .collect();
        ranked.sort_by(|(a, a_likes), (b, b_likes)| {
            b_likes
                .cmp(a_likes)
                .then_with(|| b.published_at.cmp(&a.published_at))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<()> {
        let mut t = self.tables.write();
        if !t.articles.contains_key(&comment.article_id) {
            return Err(AppError::not_found("Article"));
        }
        t.comments.insert(comment.id.clone(), comment.clone());
        Ok(())
    }

    async fn get_comment(&self, id: &str) -> Result<Option<Comment>> {
        Ok(self.tables.read().comments.get(id).cloned())
    }

    async fn update_comment(&self, comment: &Comment) -> Result<()> {
        let mut t = self.tables.write();
        let existing = t
            .comments
            .get_mut(&comment.id)
            .ok_or_else(|| AppError::not_found("Comment"))?;
        existing.content = comment.content.clone();
        existing.is_edited = comment.is_edited;
        existing.updated_at = comment.updated_at;
        Ok(())
    }

    async fn delete_comment(&self, id: &str) -> Result<bool> {
        let mut t = self.tables.write();
        if !t.comments.contains_key(id) {
            return Ok(false);
        }
        let ids = HashSet::from([id.to_string()]);
        t.remove_comments_cascade(&ids);
        Ok(true)
    }

    async fn list_article_comments(&self, article_id: &str) -> Result<Vec<Comment>> {
        let t = self.tables.read();
        let mut comments: Vec<Comment> = t
            .comments
            .values()
            .filter(|c| c.article_id == article_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }

    async fn list_comments(
        &self,
        published_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Comment>, usize)> {
        let t = self.tables.read();
        let mut comments: Vec<Comment> = t
            .comments
            .values()
            .filter(|c| !published_only || t.article_is_published(&c.article_id))
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(comments, offset, limit))
    }

    async fn count_replies(&self, ids: &[String]) -> Result<HashMap<String, u64>> {
        let t = self.tables.read();
        let mut counts: HashMap<String, u64> = ids.iter().map(|id| (id.clone(), 0)).collect();
        for comment in t.comments.values() {
            if let Some(parent) = &comment.parent_id {
                if let Some(n) = counts.get_mut(parent) {
                    *n += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn insert_like(&self, like: &ArticleLike) -> Result<()> {
        let mut t = self.tables.write();
        if t.likes
            .values()
            .any(|l| l.article_id == like.article_id && l.user_id == like.user_id)
        {
            return Err(AppError::UniqueViolation(constraint::LIKE_PAIR.to_string()));
        }
        t.likes.insert(like.id.clone(), like.clone());
        Ok(())
    }

    async fn delete_like(&self, article_id: &str, user_id: &str) -> Result<bool> {
        let mut t = self.tables.write();
        let before = t.likes.len();
        t.likes
            .retain(|_, l| !(l.article_id == article_id && l.user_id == user_id));
        Ok(t.likes.len() < before)
    }

    async fn like_exists(&self, article_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .likes
            .values()
            .any(|l| l.article_id == article_id && l.user_id == user_id))
    }

    async fn list_likes(&self, article_id: &str) -> Result<Vec<ArticleLike>> {
        let t = self.tables.read();
        let mut likes: Vec<ArticleLike> = t
            .likes
            .values()
            .filter(|l| l.article_id == article_id)
            .cloned()
            .collect();
        likes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(likes)
    }

    async fn liked_article_ids(
        &self,
        user_id: &str,
        article_ids: &[String],
    ) -> Result<HashSet<String>> {
        let t = self.tables.read();
        Ok(t.likes
            .values()
            .filter(|l| l.user_id == user_id && article_ids.contains(&l.article_id))
            .map(|l| l.article_id.clone())
            .collect())
    }

    async fn insert_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        let mut t = self.tables.write();
        if t.bookmarks
            .values()
            .any(|b| b.article_id == bookmark.article_id && b.user_id == bookmark.user_id)
        {
            return Err(AppError::UniqueViolation(constraint::BOOKMARK_PAIR.to_string()));
        }
        t.bookmarks.insert(bookmark.id.clone(), bookmark.clone());
        Ok(())
    }

    async fn delete_bookmark(&self, article_id: &str, user_id: &str) -> Result<bool> {
        let mut t = self.tables.write();
        let before = t.bookmarks.len();
        t.bookmarks
            .retain(|_, b| !(b.article_id == article_id && b.user_id == user_id));
        Ok(t.bookmarks.len() < before)
    }

    async fn bookmark_exists(&self, article_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .bookmarks
            .values()
            .any(|b| b.article_id == article_id && b.user_id == user_id))
    }

    async fn list_bookmarks(
        &self,
        user_id: &str,
        published_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Bookmark>, usize)> {
        let t = self.tables.read();
        let mut bookmarks: Vec<Bookmark> = t
            .bookmarks
            .values()
            .filter(|b| b.user_id == user_id)
            .filter(|b| match t.articles.get(&b.article_id) {
                Some(article) => !published_only || article.is_published,
                None => false,
            })
            .cloned()
            .collect();
        bookmarks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(bookmarks, offset, limit))
    }

    async fn bookmarked_article_ids(
        &self,
        user_id: &str,
        article_ids: &[String],
    ) -> Result<HashSet<String>> {
        let t = self.tables.read();
        Ok(t.bookmarks
            .values()
            .filter(|b| b.user_id == user_id && article_ids.contains(&b.article_id))
            .map(|b| b.article_id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(name: &str) -> User {
        User {
            id: format!("u-{}", name),
            username: name.to_string(),
            email: format!("{}@x.com", name),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_staff: false,
            is_active: true,
            date_joined: Utc::now(),
        }
    }

    fn article(id: &str, author: &str) -> Article {
        Article {
            id: id.to_string(),
            title: id.to_string(),
            slug: id.to_string(),
            content: "some content here".to_string(),
            excerpt: String::new(),
            featured_image: None,
            is_published: true,
            published_at: Utc::now(),
            updated_at: Utc::now(),
            views_count: 0,
            author_id: author.to_string(),
            tag_ids: vec![],
        }
    }

    fn comment(id: &str, article: &str, user: &str, parent: Option<&str>) -> Comment {
        Comment {
            id: id.to_string(),
            article_id: article.to_string(),
            user_id: user.to_string(),
            parent_id: parent.map(str::to_string),
            content: "hi there".to_string(),
            is_edited: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_unique_username_and_email() {
        let store = MemoryStore::new();
        store.insert_user(&user("alice")).await.unwrap();

        let mut dup = user("alice");
        dup.id = "other".to_string();
        dup.email = "new@x.com".to_string();
        let err = store.insert_user(&dup).await.unwrap_err();
        assert!(matches!(err, AppError::UniqueViolation(ref f) if f == constraint::USERNAME));

        let mut dup = user("bob");
        dup.email = "alice@x.com".to_string();
        let err = store.insert_user(&dup).await.unwrap_err();
        assert!(matches!(err, AppError::UniqueViolation(ref f) if f == constraint::EMAIL));
    }

    #[tokio::test]
    async fn test_view_increment_after_delete_is_none() {
        let store = MemoryStore::new();
        store.insert_article(&article("a1", "u")).await.unwrap();
        assert!(store.delete_article("a1").await.unwrap());

        assert_eq!(store.increment_views("a1").await.unwrap(), None);
        assert!(store.get_article("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_comment_edit_refreshes_updated_at() {
        let store = MemoryStore::new();
        store.insert_article(&article("a1", "u")).await.unwrap();
        let original = comment("c1", "a1", "u", None);
        store.insert_comment(&original).await.unwrap();

        let mut edited = original.clone();
        edited.content = "edited".to_string();
        edited.is_edited = true;
        edited.updated_at = original.updated_at + chrono::Duration::minutes(1);
        store.update_comment(&edited).await.unwrap();

        let stored = store.get_comment("c1").await.unwrap().unwrap();
        assert!(stored.updated_at > original.updated_at);
        assert!(stored.is_edited);
    }

    #[tokio::test]
    async fn test_update_article_keeps_views_and_slug() {
        let store = MemoryStore::new();
        store.insert_article(&article("a1", "u")).await.unwrap();
        store.increment_views("a1").await.unwrap();

        let mut changed = article("a1", "u");
        changed.slug = "changed".to_string();
        changed.title = "New title".to_string();
        store.update_article(&changed).await.unwrap();

        let stored = store.get_article("a1").await.unwrap().unwrap();
        assert_eq!(stored.title, "New title");
        assert_eq!(stored.slug, "a1");
        assert_eq!(stored.views_count, 1);
    }

    #[tokio::test]
    async fn test_delete_article_cascades() {
        let store = MemoryStore::new();
        store.insert_article(&article("a1", "u")).await.unwrap();
        store.insert_comment(&comment("c1", "a1", "u", None)).await.unwrap();
        store.insert_like(&ArticleLike::new("a1", "u")).await.unwrap();
        store.insert_bookmark(&Bookmark::new("a1", "u")).await.unwrap();

        assert!(store.delete_article("a1").await.unwrap());
        assert!(store.get_comment("c1").await.unwrap().is_none());
        assert!(!store.like_exists("a1", "u").await.unwrap());
        assert!(!store.bookmark_exists("a1", "u").await.unwrap());
        assert!(!store.delete_article("a1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_comment_cascades_to_replies() {
        let store = MemoryStore::new();
        store.insert_article(&article("a1", "u")).await.unwrap();
        store.insert_comment(&comment("c1", "a1", "u", None)).await.unwrap();
        store.insert_comment(&comment("c2", "a1", "v", Some("c1"))).await.unwrap();
        store.insert_comment(&comment("c3", "a1", "v", None)).await.unwrap();

        let counts = store.count_replies(&["c1".to_string()]).await.unwrap();
        assert_eq!(counts["c1"], 1);

        store.delete_comment("c1").await.unwrap();
        assert!(store.get_comment("c2").await.unwrap().is_none());
        assert!(store.get_comment("c3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let store = MemoryStore::new();
        let alice = user("alice");
        let bob = user("bob");
        store.insert_user(&alice).await.unwrap();
        store.insert_user(&bob).await.unwrap();
        store.insert_profile(&Profile::empty_for(&alice.id)).await.unwrap();

        store.insert_article(&article("a1", &alice.id)).await.unwrap();
        store.insert_article(&article("b1", &bob.id)).await.unwrap();
        store.insert_comment(&comment("c1", "b1", &alice.id, None)).await.unwrap();
        store.insert_comment(&comment("c2", "b1", &bob.id, Some("c1"))).await.unwrap();
        store.insert_comment(&comment("c3", "a1", &bob.id, None)).await.unwrap();
        store.insert_like(&ArticleLike::new("b1", &alice.id)).await.unwrap();

        assert!(store.delete_user(&alice.id).await.unwrap());
        assert!(store.get_profile(&alice.id).await.unwrap().is_none());
        assert!(store.get_article("a1").await.unwrap().is_none());
        assert!(store.get_article("b1").await.unwrap().is_some());
        assert!(store.get_comment("c1").await.unwrap().is_none());
        assert!(store.get_comment("c2").await.unwrap().is_none());
        assert!(store.get_comment("c3").await.unwrap().is_none());
        assert!(!store.like_exists("b1", &alice.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_user_fields_leaves_other_columns() {
        let store = MemoryStore::new();
        let mut alice = user("alice");
        alice.password_hash = "old-hash".to_string();
        store.insert_user(&alice).await.unwrap();
        store.insert_user(&user("bob")).await.unwrap();

        // 两次独立的定向写入互不覆盖
        store
            .update_user_fields(&alice.id, &UserChanges { is_staff: Some(true), ..Default::default() })
            .await
            .unwrap();
        let stored = store
            .update_user_fields(
                &alice.id,
                &UserChanges { first_name: Some("Alice".to_string()), ..Default::default() },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_staff);
        assert_eq!(stored.first_name, "Alice");
        assert_eq!(stored.password_hash, "old-hash");

        let err = store
            .update_user_fields(
                &alice.id,
                &UserChanges { email: Some("bob@x.com".to_string()), ..Default::default() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UniqueViolation(ref f) if f == constraint::EMAIL));

        assert!(store
            .update_user_fields("missing", &UserChanges::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_listings_skip_drafts_when_asked() {
        let store = MemoryStore::new();
        let mut draft = article("d1", "u");
        draft.is_published = false;
        store.insert_article(&article("a1", "u")).await.unwrap();
        store.insert_article(&draft).await.unwrap();
        store.insert_comment(&comment("c1", "a1", "u", None)).await.unwrap();
        store.insert_comment(&comment("c2", "d1", "u", None)).await.unwrap();
        store.insert_bookmark(&Bookmark::new("a1", "u")).await.unwrap();
        store.insert_bookmark(&Bookmark::new("d1", "u")).await.unwrap();

        assert_eq!(store.list_comments(true, 0, 10).await.unwrap().1, 1);
        assert_eq!(store.list_comments(false, 0, 10).await.unwrap().1, 2);
        let (bookmarks, total) = store.list_bookmarks("u", true, 0, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(bookmarks[0].article_id, "a1");
        assert_eq!(store.list_bookmarks("u", false, 0, 10).await.unwrap().1, 2);
    }

    #[tokio::test]
    async fn test_trending_ranks_recent_likes_then_recency() {
        let store = MemoryStore::new();
        let mut older = article("old", "u");
        older.published_at = Utc::now() - chrono::Duration::days(3);
        store.insert_article(&older).await.unwrap();
        store.insert_article(&article("new", "u")).await.unwrap();
        store.insert_article(&article("hot", "u")).await.unwrap();

        let mut stale = ArticleLike::new("old", "v");
        stale.created_at = Utc::now() - chrono::Duration::days(30);
        store.insert_like(&stale).await.unwrap();
        store.insert_like(&ArticleLike::new("hot", "u")).await.unwrap();
        store.insert_like(&ArticleLike::new("hot", "v")).await.unwrap();

        let since = Utc::now() - chrono::Duration::days(7);
        let ranked = store
            .trending_articles(&ArticleFilter::published(), since, 2)
            .await
            .unwrap();
        let ids: Vec<(&str, u64)> = ranked.iter().map(|(a, n)| (a.id.as_str(), *n)).collect();
        assert_eq!(ids, vec![("hot", 2), ("new", 0)]);
    }

    #[tokio::test]
    async fn test_like_pair_is_unique() {
        let store = MemoryStore::new();
        store.insert_like(&ArticleLike::new("a1", "u")).await.unwrap();
        let err = store.insert_like(&ArticleLike::new("a1", "u")).await.unwrap_err();
        assert!(err.is_unique_violation());
        store.insert_like(&ArticleLike::new("a1", "v")).await.unwrap();
        assert_eq!(store.list_likes("a1").await.unwrap().len(), 2);
    }
}
