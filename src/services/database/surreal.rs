use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use surrealdb::{
    engine::any::{self, Any},
    opt::auth::Root,
    Response, Surreal,
};
use tracing::{debug, error, info};

use super::{constraint, Store};
use crate::{
    config::Config,
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

/// 唯一索引：(索引名, 表, 字段, 对应的约束名)
const UNIQUE_INDEXES: &[(&str, &str, &str, &str)] = &[
    ("user_username", "user", "username", constraint::USERNAME),
    ("user_email", "user", "email", constraint::EMAIL),
    ("profile_user", "profile", "user_id", constraint::PROFILE_USER),
    ("tag_name", "tag", "name", constraint::TAG_NAME),
    ("tag_slug", "tag", "slug", constraint::TAG_SLUG),
    ("article_slug", "article", "slug", constraint::ARTICLE_SLUG),
    ("like_pair", "article_like", "article_id, user_id", constraint::LIKE_PAIR),
    ("bookmark_pair", "bookmark", "article_id, user_id", constraint::BOOKMARK_PAIR),
];

/// SurrealDB 存储
///
/// 记录以 `table:<uuid>` 存放，读取时用 `meta::id(id) AS id` 还原为字符串 id。
/// 时间字段额外写入微秒时间戳（`*_ts`），排序与范围比较都走该字段。
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct GroupRow {
    key: String,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ViewsRow {
    views_count: u64,
}

#[derive(Debug, Deserialize)]
struct PairRow {
    #[allow(dead_code)]
    article_id: String,
}

#[derive(Debug, Deserialize)]
struct TagIdsRow {
    tag_ids: Vec<String>,
}

/// 将模型转换为去掉 id 的记录内容，并附加时间戳列
fn record_content<T: Serialize>(model: &T, timestamps: &[(&str, DateTime<Utc>)]) -> Result<Value> {
    let mut value = serde_json::to_value(model)?;
    if let Value::Object(map) = &mut value {
        map.remove("id");
        for (column, at) in timestamps {
            map.insert(format!("{}_ts", column), json!(at.timestamp_micros()));
        }
    }
    Ok(value)
}

/// 将唯一索引冲突翻译为 `UniqueViolation`
fn map_db_error(err: surrealdb::Error) -> AppError {
    let message = err.to_string();
    if message.contains("already contains") {
        for (index, _, _, name) in UNIQUE_INDEXES {
            if message.contains(&format!("`{}`", index)) {
                return AppError::UniqueViolation((*name).to_string());
            }
        }
    }
    AppError::Database(err)
}

/// LIMIT/START 参数需落在 i64 范围内
fn bounded(n: usize) -> u64 {
    n.min(i64::MAX as usize) as u64
}

/// 条件更新：记录不存在时不匹配任何行
const INCREMENT_VIEWS: &str =
    "UPDATE article SET views_count += 1 WHERE id = type::thing('article', $id) RETURN views_count";

const DELETE_COMMENT_CASCADE: &str = r#"
    BEGIN TRANSACTION;
    DELETE comment WHERE parent_id = $id;
    DELETE type::thing('comment', $id);
    COMMIT TRANSACTION;
"#;

/// 编辑评论时写入的字段
fn comment_edit_content(comment: &Comment) -> Value {
    json!({
        "content": comment.content,
        "is_edited": comment.is_edited,
        "updated_at": comment.updated_at,
        "updated_at_ts": comment.updated_at.timestamp_micros(),
    })
}

const USER_FIELDS: &str = "*, meta::id(id) AS id";
const ARTICLE_FIELDS: &str = "*, meta::id(id) AS id";

impl SurrealStore {
    pub async fn connect(config: &Config) -> Result<Self> {
        let db = any::connect(config.database_url.as_str()).await?;
        db.signin(Root {
            username: &config.database_username,
            password: &config.database_password,
        })
        .await?;
        db.use_ns(config.database_namespace.as_str())
            .use_db(config.database_name.as_str())
            .await?;

        Ok(Self { db })
    }

    /// 定义唯一索引，可重复执行
    pub async fn define_schema(&self) -> Result<()> {
        for (index, table, fields, _) in UNIQUE_INDEXES {
            let sql = format!(
                "DEFINE INDEX {} ON TABLE {} FIELDS {} UNIQUE",
                index, table, fields
            );
            self.query(&sql, json!({})).await?;
        }
        info!("Database schema defined");
        Ok(())
    }

    /// 执行带参数的查询，并检查每条语句的结果
    async fn query(&self, sql: &str, params: Value) -> Result<Response> {
        debug!("Executing query: {}", sql);
        let response = self.db.query(sql).bind(params).await.map_err(map_db_error)?;
        response.check().map_err(|e| {
            let err = map_db_error(e);
            if !err.is_unique_violation() {
                error!("Query failed: {}", err);
            }
            err
        })
    }

    async fn fetch_all<T: DeserializeOwned>(&self, sql: &str, params: Value) -> Result<Vec<T>> {
        let mut response = self.query(sql, params).await?;
        Ok(response.take(0)?)
    }

    async fn fetch_one<T: DeserializeOwned>(&self, sql: &str, params: Value) -> Result<Option<T>> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    async fn count(&self, sql: &str, params: Value) -> Result<u64> {
        let row: Option<CountRow> = self.fetch_one(sql, params).await?;
        Ok(row.map(|r| r.total).unwrap_or(0))
    }

    async fn create(&self, table: &str, id: &str, content: Value) -> Result<()> {
        self.query(
            "CREATE type::thing($tb, $id) CONTENT $content",
            json!({ "tb": table, "id": id, "content": content }),
        )
        .await?;
        Ok(())
    }

    /// 仅更新已存在的记录，不会凭空创建
    async fn merge(&self, table: &str, id: &str, content: Value) -> Result<()> {
        self.query(
            "UPDATE type::table($tb) MERGE $content WHERE id = type::thing($tb, $id) RETURN NONE",
            json!({ "tb": table, "id": id, "content": content }),
        )
        .await?;
        Ok(())
    }

    async fn grouped_counts(&self, sql: &str, params: Value) -> Result<HashMap<String, u64>> {
        let rows: Vec<GroupRow> = self.fetch_all(sql, params).await?;
        Ok(rows.into_iter().map(|r| (r.key, r.total)).collect())
    }

    async fn ids_where(&self, table: &str, condition: &str, params: Value) -> Result<Vec<String>> {
        let sql = format!("SELECT VALUE meta::id(id) FROM {} WHERE {}", table, condition);
        self.fetch_all(&sql, params).await
    }

    /// 将过滤器翻译为 WHERE 子句及参数
    async fn article_where(&self, filter: &ArticleFilter) -> Result<(String, Value)> {
        let mut clauses = vec!["true".to_string()];
        let mut params = serde_json::Map::new();

        if filter.published_only {
            clauses.push("is_published = true".to_string());
        }
        if let Some(flag) = filter.is_published {
            clauses.push("is_published = $is_published".to_string());
            params.insert("is_published".into(), json!(flag));
        }
        if let Some(title) = &filter.title {
            clauses.push("string::lowercase(title) CONTAINS $title".to_string());
            params.insert("title".into(), json!(title));
        }
        if let Some(author) = &filter.author {
            let ids = self
                .ids_where("user", "string::lowercase(username) CONTAINS $q", json!({ "q": author }))
                .await?;
            clauses.push("author_id INSIDE $author_ids".to_string());
            params.insert("author_ids".into(), json!(ids));
        }
        if let Some(author_id) = &filter.author_id {
            clauses.push("author_id = $author_id".to_string());
            params.insert("author_id".into(), json!(author_id));
        }
        if let Some(tag) = &filter.tag {
            let ids = self
                .ids_where("tag", "string::lowercase(name) = $q", json!({ "q": tag }))
                .await?;
            clauses.push("tag_ids CONTAINSANY $tag_name_ids".to_string());
            params.insert("tag_name_ids".into(), json!(ids));
        }
        if let Some(tag_id) = &filter.tag_id {
            clauses.push("tag_ids CONTAINS $tag_id".to_string());
            params.insert("tag_id".into(), json!(tag_id));
        }
        if let Some(after) = filter.published_after {
            clauses.push("published_at_ts >= $after".to_string());
            params.insert("after".into(), json!(after.timestamp_micros()));
        }
        if let Some(before) = filter.published_before {
            clauses.push("published_at_ts <= $before".to_string());
            params.insert("before".into(), json!(before.timestamp_micros()));
        }
        if let Some(min_views) = filter.min_views {
            clauses.push("views_count >= $min_views".to_string());
            params.insert("min_views".into(), json!(min_views));
        }

        for (i, term) in filter.search_terms.iter().enumerate() {
            let q = json!({ "q": term });
            let users = self
                .ids_where("user", "string::lowercase(username) CONTAINS $q", q.clone())
                .await?;
            let tags = self
                .ids_where("tag", "string::lowercase(name) CONTAINS $q", q)
                .await?;
            clauses.push(format!(
                "(string::lowercase(title) CONTAINS $s{i} OR string::lowercase(content) CONTAINS $s{i} \
                 OR string::lowercase(excerpt) CONTAINS $s{i} OR author_id INSIDE $s{i}_users \
                 OR tag_ids CONTAINSANY $s{i}_tags)"
            ));
            params.insert(format!("s{i}"), json!(term));
            params.insert(format!("s{i}_users"), json!(users));
            params.insert(format!("s{i}_tags"), json!(tags));
        }

        Ok((clauses.join(" AND "), Value::Object(params)))
    }
}

fn article_content(article: &Article) -> Result<Value> {
    record_content(
        article,
        &[("published_at", article.published_at), ("updated_at", article.updated_at)],
    )
}

#[async_trait]
impl Store for SurrealStore {
    async fn verify_connection(&self) -> Result<()> {
        self.query("INFO FOR DB", json!({})).await?;
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        // serde 会跳过 password_hash，需单独写入
        let mut content = record_content(user, &[])?;
        content["password_hash"] = json!(user.password_hash);
        self.create("user", &user.id, content).await
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM type::thing('user', $id)", USER_FIELDS);
        self.fetch_one(&sql, json!({ "id": id })).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM user WHERE username = $v LIMIT 1", USER_FIELDS);
        self.fetch_one(&sql, json!({ "v": username })).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM user WHERE email = $v LIMIT 1", USER_FIELDS);
        self.fetch_one(&sql, json!({ "v": email })).await
    }

    async fn update_user_fields(&self, id: &str, changes: &UserChanges) -> Result<Option<User>> {
        if !changes.is_empty() {
            self.merge("user", id, json!(changes)).await?;
        }
        self.get_user(id).await
    }

    async fn list_users(
        &self,
        search: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<User>, usize)> {
        let condition = match search {
            Some(_) => {
                "string::lowercase(username) CONTAINS $q OR string::lowercase(first_name) CONTAINS $q \
                 OR string::lowercase(last_name) CONTAINS $q"
            }
            None => "true",
        };
        let params = json!({
            "q": search.map(str::to_lowercase),
            "limit": bounded(limit),
            "start": bounded(offset),
        });

        let total = self
            .count(
                &format!("SELECT count() AS total FROM user WHERE {} GROUP ALL", condition),
                params.clone(),
            )
            .await?;
        let users = self
            .fetch_all(
                &format!(
                    "SELECT {} FROM user WHERE {} ORDER BY username ASC LIMIT $limit START $start",
                    USER_FIELDS, condition
                ),
                params,
            )
            .await?;
        Ok((users, total as usize))
    }

    async fn delete_user(&self, id: &str) -> Result<bool> {
        if self.get_user(id).await?.is_none() {
            return Ok(false);
        }
        let sql = r#"
            BEGIN TRANSACTION;
            LET $articles = (SELECT VALUE meta::id(id) FROM article WHERE author_id = $id);
            LET $comments = (SELECT VALUE meta::id(id) FROM comment WHERE user_id = $id OR article_id INSIDE $articles);
            DELETE comment WHERE meta::id(id) INSIDE $comments OR parent_id INSIDE $comments;
            DELETE article_like WHERE user_id = $id OR article_id INSIDE $articles;
            DELETE bookmark WHERE user_id = $id OR article_id INSIDE $articles;
            DELETE article WHERE author_id = $id;
            DELETE profile WHERE user_id = $id;
            DELETE type::thing('user', $id);
            COMMIT TRANSACTION;
        "#;
        self.query(sql, json!({ "id": id })).await?;
        Ok(true)
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        self.fetch_one(
            "SELECT *, meta::id(id) AS id FROM profile WHERE user_id = $v LIMIT 1",
            json!({ "v": user_id }),
        )
        .await
    }

    async fn insert_profile(&self, profile: &Profile) -> Result<()> {
        self.create("profile", &profile.id, record_content(profile, &[])?)
            .await
    }

    async fn update_profile(&self, profile: &Profile) -> Result<()> {
        self.merge("profile", &profile.id, record_content(profile, &[])?)
            .await
    }

    async fn count_articles_by_author(&self, user_id: &str) -> Result<u64> {
        self.count(
            "SELECT count() AS total FROM article WHERE author_id = $v GROUP ALL",
            json!({ "v": user_id }),
        )
        .await
    }

    async fn count_comments_by_user(&self, user_id: &str) -> Result<u64> {
        self.count(
            "SELECT count() AS total FROM comment WHERE user_id = $v GROUP ALL",
            json!({ "v": user_id }),
        )
        .await
    }

    async fn insert_tag(&self, tag: &Tag) -> Result<()> {
        self.create("tag", &tag.id, record_content(tag, &[("created_at", tag.created_at)])?)
            .await
    }

    async fn get_tag(&self, id: &str) -> Result<Option<Tag>> {
        self.fetch_one(
            "SELECT *, meta::id(id) AS id FROM type::thing('tag', $id)",
            json!({ "id": id }),
        )
        .await
    }

    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        self.fetch_one(
            "SELECT *, meta::id(id) AS id FROM tag WHERE name = $v LIMIT 1",
            json!({ "v": name }),
        )
        .await
    }

    async fn get_tags(&self, ids: &[String]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let tags: Vec<Tag> = self
            .fetch_all(
                "SELECT *, meta::id(id) AS id FROM tag WHERE meta::id(id) INSIDE $ids",
                json!({ "ids": ids }),
            )
            .await?;
        // 保持关联顺序
        let mut by_id: HashMap<String, Tag> = tags.into_iter().map(|t| (t.id.clone(), t)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn list_tags_with_counts(&self, search: Option<&str>) -> Result<Vec<TagWithCount>> {
        let tags: Vec<Tag> = match search {
            Some(q) => {
                self.fetch_all(
                    "SELECT *, meta::id(id) AS id FROM tag WHERE string::lowercase(name) CONTAINS $q \
                     OR string::lowercase(description) CONTAINS $q",
                    json!({ "q": q.to_lowercase() }),
                )
                .await?
            }
            None => {
                self.fetch_all("SELECT *, meta::id(id) AS id FROM tag", json!({}))
                    .await?
            }
        };

        let rows: Vec<TagIdsRow> = self
            .fetch_all("SELECT tag_ids FROM article WHERE is_published = true", json!({}))
            .await?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for row in rows {
            for id in row.tag_ids {
                *counts.entry(id).or_default() += 1;
            }
        }

        Ok(tags
            .into_iter()
            .map(|tag| TagWithCount {
                articles_count: counts.get(&tag.id).copied().unwrap_or(0),
                tag,
            })
            .collect())
    }

    async fn count_published_with_tag(&self, tag_id: &str) -> Result<u64> {
        self.count(
            "SELECT count() AS total FROM article WHERE is_published = true AND tag_ids CONTAINS $id GROUP ALL",
            json!({ "id": tag_id }),
        )
        .await
    }

    async fn insert_article(&self, article: &Article) -> Result<()> {
        self.create("article", &article.id, article_content(article)?)
            .await
    }

    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        self.fetch_one(
            "SELECT *, meta::id(id) AS id FROM type::thing('article', $id)",
            json!({ "id": id }),
        )
        .await
    }

    async fn find_article_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        self.fetch_one(
            "SELECT *, meta::id(id) AS id FROM article WHERE slug = $v LIMIT 1",
            json!({ "v": slug }),
        )
        .await
    }

    async fn get_articles(&self, ids: &[String]) -> Result<Vec<Article>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let articles: Vec<Article> = self
            .fetch_all(
                &format!("SELECT {} FROM article WHERE meta::id(id) INSIDE $ids", ARTICLE_FIELDS),
                json!({ "ids": ids }),
            )
            .await?;
        let mut by_id: HashMap<String, Article> =
            articles.into_iter().map(|a| (a.id.clone(), a)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn slugs_with_base(&self, base: &str) -> Result<Vec<String>> {
        self.fetch_all(
            "SELECT VALUE slug FROM article WHERE slug = $base OR string::starts_with(slug, $prefix)",
            json!({ "base": base, "prefix": format!("{}-", base) }),
        )
        .await
    }

    async fn title_exists(&self, title: &str) -> Result<bool> {
        let total = self
            .count(
                "SELECT count() AS total FROM article WHERE string::lowercase(title) = $v GROUP ALL",
                json!({ "v": title.to_lowercase() }),
            )
            .await?;
        Ok(total > 0)
    }

    async fn update_article(&self, article: &Article) -> Result<()> {
        let mut content = article_content(article)?;
        if let Value::Object(map) = &mut content {
            map.remove("views_count");
            map.remove("slug");
            map.remove("published_at");
            map.remove("published_at_ts");
            map.remove("author_id");
        }
        self.merge("article", &article.id, content).await
    }

    async fn delete_article(&self, id: &str) -> Result<bool> {
        if self.get_article(id).await?.is_none() {
            return Ok(false);
        }
        let sql = r#"
            BEGIN TRANSACTION;
            DELETE comment WHERE article_id = $id;
            DELETE article_like WHERE article_id = $id;
            DELETE bookmark WHERE article_id = $id;
            DELETE type::thing('article', $id);
            COMMIT TRANSACTION;
        "#;
        self.query(sql, json!({ "id": id })).await?;
        Ok(true)
    }

    async fn increment_views(&self, id: &str) -> Result<Option<u64>> {
        let row: Option<ViewsRow> = self.fetch_one(INCREMENT_VIEWS, json!({ "id": id })).await?;
        Ok(row.map(|r| r.views_count))
    }

    async fn list_articles(
        &self,
        filter: &ArticleFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Article>, usize)> {
        let (condition, mut params) = self.article_where(filter).await?;
        let order = filter
            .ordering
            .to_surql()
            .replace("published_at", "published_at_ts")
            .replace("updated_at", "updated_at_ts");

        let total = self
            .count(
                &format!("SELECT count() AS total FROM article WHERE {} GROUP ALL", condition),
                params.clone(),
            )
            .await?;

        params["limit"] = json!(bounded(limit));
        params["start"] = json!(bounded(offset));
        let articles = self
            .fetch_all(
                &format!(
                    "SELECT *, meta::id(id) AS id FROM article WHERE {} ORDER BY {} LIMIT $limit START $start",
                    condition, order
                ),
                params,
            )
            .await?;
        Ok((articles, total as usize))
    }

    async fn article_counts(&self, ids: &[String]) -> Result<HashMap<String, ArticleCounts>> {
        let params = json!({ "ids": ids });
        let likes = self
            .grouped_counts(
                "SELECT article_id AS key, count() AS total FROM article_like WHERE article_id INSIDE $ids GROUP BY key",
                params.clone(),
            )
            .await?;
        let comments = self
            .grouped_counts(
                "SELECT article_id AS key, count() AS total FROM comment WHERE article_id INSIDE $ids GROUP BY key",
                params,
            )
            .await?;

        Ok(ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    ArticleCounts {
                        likes_count: likes.get(id).copied().unwrap_or(0),
                        comments_count: comments.get(id).copied().unwrap_or(0),
                    },
                )
            })
            .collect())
    }

    async fn trending_articles(
        &self,
        filter: &ArticleFilter,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(Article, u64)>> {
        let recent = self
            .grouped_counts(
                "SELECT article_id AS key, count() AS total FROM article_like WHERE created_at_ts >= $since GROUP BY key",
                json!({ "since": since.timestamp_micros() }),
            )
            .await?;
        let liked: Vec<&String> = recent.keys().collect();

        let (condition, mut params) = self.article_where(filter).await?;
        params["liked"] = json!(liked);

        let candidates: Vec<Article> = self
            .fetch_all(
                &format!(
                    "SELECT {} FROM article WHERE {} AND meta::id(id) INSIDE $liked",
                    ARTICLE_FIELDS, condition
                ),
                params.clone(),
            )
            .await?;
        let mut ranked: Vec<(Article, u64)> = candidates
            .into_iter()
            .map(|a| {
                let likes = recent.get(&a.id).copied().unwrap_or(0);
                (a, likes)
            })
            .collect();
        ranked.sort_by(|(a, a_likes), (b, b_likes)| {
            b_likes
                .cmp(a_likes)
                .then_with(|| b.published_at.cmp(&a.published_at))
        });
        ranked.truncate(limit);

        // 点赞不足时用最新发布的文章补齐
        if ranked.len() < limit {
            params["limit"] = json!(bounded(limit - ranked.len()));
            let rest: Vec<Article> = self
                .fetch_all(
                    &format!(
                        "SELECT {} FROM article WHERE {} AND meta::id(id) NOTINSIDE $liked \
                         ORDER BY published_at_ts DESC LIMIT $limit",
                        ARTICLE_FIELDS, condition
                    ),
                    params,
                )
                .await?;
            ranked.extend(rest.into_iter().map(|a| (a, 0)));
        }
        Ok(ranked)
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<()> {
        self.create(
            "comment",
            &comment.id,
            record_content(
                comment,
                &[("created_at", comment.created_at), ("updated_at", comment.updated_at)],
            )?,
        )
        .await
    }

    async fn get_comment(&self, id: &str) -> Result<Option<Comment>> {
        self.fetch_one(
            "SELECT *, meta::id(id) AS id FROM type::thing('comment', $id)",
            json!({ "id": id }),
        )
        .await
    }

    async fn update_comment(&self, comment: &Comment) -> Result<()> {
        self.merge("comment", &comment.id, comment_edit_content(comment)).await
    }

    async fn delete_comment(&self, id: &str) -> Result<bool> {
        if self.get_comment(id).await?.is_none() {
            return Ok(false);
        }
        self.query(DELETE_COMMENT_CASCADE, json!({ "id": id })).await?;
        Ok(true)
    }

    async fn list_article_comments(&self, article_id: &str) -> Result<Vec<Comment>> {
        self.fetch_all(
            "SELECT *, meta::id(id) AS id FROM comment WHERE article_id = $v ORDER BY created_at_ts DESC",
            json!({ "v": article_id }),
        )
        .await
    }

    async fn list_comments(
        &self,
        published_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Comment>, usize)> {
        let condition = if published_only {
            "article_id INSIDE (SELECT VALUE meta::id(id) FROM article WHERE is_published = true)"
        } else {
            "true"
        };
        let params = json!({ "limit": bounded(limit), "start": bounded(offset) });

        let total = self
            .count(
                &format!("SELECT count() AS total FROM comment WHERE {} GROUP ALL", condition),
                params.clone(),
            )
            .await?;
        let comments = self
            .fetch_all(
                &format!(
                    "SELECT *, meta::id(id) AS id FROM comment WHERE {} \
                     ORDER BY created_at_ts DESC LIMIT $limit START $start",
                    condition
                ),
                params,
            )
            .await?;
        Ok((comments, total as usize))
    }

    async fn count_replies(&self, ids: &[String]) -> Result<HashMap<String, u64>> {
        let counts = self
            .grouped_counts(
                "SELECT parent_id AS key, count() AS total FROM comment WHERE parent_id INSIDE $ids GROUP BY key",
                json!({ "ids": ids }),
            )
            .await?;
        Ok(ids
            .iter()
            .map(|id| (id.clone(), counts.get(id).copied().unwrap_or(0)))
            .collect())
    }

    async fn insert_like(&self, like: &ArticleLike) -> Result<()> {
        self.create(
            "article_like",
            &like.id,
            record_content(like, &[("created_at", like.created_at)])?,
        )
        .await
    }

    async fn delete_like(&self, article_id: &str, user_id: &str) -> Result<bool> {
        let deleted: Vec<PairRow> = self
            .fetch_all(
                "DELETE article_like WHERE article_id = $a AND user_id = $u RETURN BEFORE",
                json!({ "a": article_id, "u": user_id }),
            )
            .await?;
        Ok(!deleted.is_empty())
    }

    async fn like_exists(&self, article_id: &str, user_id: &str) -> Result<bool> {
        let total = self
            .count(
                "SELECT count() AS total FROM article_like WHERE article_id = $a AND user_id = $u GROUP ALL",
                json!({ "a": article_id, "u": user_id }),
            )
            .await?;
        Ok(total > 0)
    }

    async fn list_likes(&self, article_id: &str) -> Result<Vec<ArticleLike>> {
        self.fetch_all(
            "SELECT *, meta::id(id) AS id FROM article_like WHERE article_id = $v ORDER BY created_at_ts DESC",
            json!({ "v": article_id }),
        )
        .await
    }

    async fn liked_article_ids(
        &self,
        user_id: &str,
        article_ids: &[String],
    ) -> Result<HashSet<String>> {
        let ids: Vec<String> = self
            .fetch_all(
                "SELECT VALUE article_id FROM article_like WHERE user_id = $u AND article_id INSIDE $ids",
                json!({ "u": user_id, "ids": article_ids }),
            )
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn insert_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        self.create(
            "bookmark",
            &bookmark.id,
            record_content(bookmark, &[("created_at", bookmark.created_at)])?,
        )
        .await
    }

    async fn delete_bookmark(&self, article_id: &str, user_id: &str) -> Result<bool> {
        let deleted: Vec<PairRow> = self
            .fetch_all(
                "DELETE bookmark WHERE article_id = $a AND user_id = $u RETURN BEFORE",
                json!({ "a": article_id, "u": user_id }),
            )
            .await?;
        Ok(!deleted.is_empty())
    }

    async fn bookmark_exists(&self, article_id: &str, user_id: &str) -> Result<bool> {
        let total = self
            .count(
                "SELECT count() AS total FROM bookmark WHERE article_id = $a AND user_id = $u GROUP ALL",
                json!({ "a": article_id, "u": user_id }),
            )
            .await?;
        Ok(total > 0)
    }

    async fn list_bookmarks(
        &self,
        user_id: &str,
        published_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Bookmark>, usize)> {
        let condition = if published_only {
            "user_id = $u AND article_id INSIDE (SELECT VALUE meta::id(id) FROM article WHERE is_published = true)"
        } else {
            "user_id = $u AND article_id INSIDE (SELECT VALUE meta::id(id) FROM article)"
        };
        let params = json!({ "u": user_id, "limit": bounded(limit), "start": bounded(offset) });
        let total = self
            .count(
                &format!("SELECT count() AS total FROM bookmark WHERE {} GROUP ALL", condition),
                params.clone(),
            )
            .await?;
        let bookmarks = self
            .fetch_all(
                &format!(
                    "SELECT *, meta::id(id) AS id FROM bookmark WHERE {} \
                     ORDER BY created_at_ts DESC LIMIT $limit START $start",
                    condition
                ),
                params,
            )
            .await?;
        Ok((bookmarks, total as usize))
    }

    async fn bookmarked_article_ids(
        &self,
        user_id: &str,
        article_ids: &[String],
    ) -> Result<HashSet<String>> {
        let ids: Vec<String> = self
            .fetch_all(
                "SELECT VALUE article_id FROM bookmark WHERE user_id = $u AND article_id INSIDE $ids",
                json!({ "u": user_id, "ids": article_ids }),
            )
            .await?;
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_content_strips_id_and_adds_timestamps() {
        let like = ArticleLike::new("a1", "u1");
        let content = record_content(&like, &[("created_at", like.created_at)]).unwrap();

        assert!(content.get("id").is_none());
        assert_eq!(content["article_id"], "a1");
        assert_eq!(content["created_at_ts"], json!(like.created_at.timestamp_micros()));
    }

    #[test]
    fn test_view_increment_never_creates_records() {
        assert!(INCREMENT_VIEWS.starts_with("UPDATE article SET"));
        assert!(INCREMENT_VIEWS.contains("WHERE id = type::thing('article', $id)"));
    }

    #[test]
    fn test_comment_cascade_is_transactional() {
        let statements: Vec<&str> = DELETE_COMMENT_CASCADE
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        assert_eq!(statements.first(), Some(&"BEGIN TRANSACTION;"));
        assert_eq!(statements.last(), Some(&"COMMIT TRANSACTION;"));
        assert_eq!(statements.len(), 4);
    }

    #[test]
    fn test_comment_edit_refreshes_sort_column() {
        let mut comment = Comment {
            id: "c1".to_string(),
            article_id: "a1".to_string(),
            user_id: "u1".to_string(),
            parent_id: None,
            content: "edited".to_string(),
            is_edited: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        comment.updated_at = comment.created_at + chrono::Duration::minutes(5);
        let content = comment_edit_content(&comment);
        assert_eq!(content["updated_at_ts"], json!(comment.updated_at.timestamp_micros()));
        assert_eq!(content["is_edited"], true);
    }

    #[test]
    fn test_bounded_window_fits_i64() {
        assert_eq!(bounded(20), 20);
        assert_eq!(bounded(usize::MAX), i64::MAX as u64);
    }

    #[test]
    fn test_user_changes_merge_only_given_fields() {
        let changes = UserChanges {
            is_staff: Some(true),
            ..Default::default()
        };
        let content = json!(changes);
        assert_eq!(content, json!({ "is_staff": true }));
    }

    #[test]
    fn test_unique_indexes_cover_every_constraint() {
        for name in [
            constraint::USERNAME,
            constraint::EMAIL,
            constraint::PROFILE_USER,
            constraint::TAG_NAME,
            constraint::TAG_SLUG,
            constraint::ARTICLE_SLUG,
            constraint::LIKE_PAIR,
            constraint::BOOKMARK_PAIR,
        ] {
            assert!(UNIQUE_INDEXES.iter().any(|(_, _, _, n)| *n == name));
        }
    }
}
