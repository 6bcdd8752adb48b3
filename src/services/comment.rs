use crate::{
    error::{AppError, Result},
    models::{
        comment::*,
        response::{PageRequest, Paginated},
        user::User,
    },
    services::{
        database::Database,
        permission::{can_view_article, Actor},
        user::UserService,
    },
    utils::html::sanitize_html,
};
use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct CommentService {
    db: Database,
    users: UserService,
}

impl CommentService {
    pub fn new(db: Database, users: UserService) -> Self {
        Self { db, users }
    }

    /// 创建评论；回复只允许一层，且必须属于同一篇文章
    pub async fn create_comment(
        &self,
        article_id: &str,
        author: &User,
        request: CreateCommentRequest,
    ) -> Result<CommentResponse> {
        debug!("Creating comment on article {} by {}", article_id, author.id);
        request.validate()?;

        if let Some(parent_id) = &request.parent {
            let parent = self.db.get_comment(parent_id).await?.ok_or_else(|| {
                AppError::field("parent", "does_not_exist", "Parent comment does not exist.")
            })?;

            if parent.article_id != article_id {
                return Err(AppError::field(
                    "parent",
                    "wrong_article",
                    "Parent comment must belong to the same article",
                ));
            }
            if parent.parent_id.is_some() {
                return Err(AppError::field(
                    "parent",
                    "too_deep",
                    "Cannot reply to a reply. Only one level of nesting allowed.",
                ));
            }
        }

        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            article_id: article_id.to_string(),
            user_id: author.id.clone(),
            parent_id: request.parent,
            content: sanitize_html(&request.content),
            is_edited: false,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_comment(&comment).await?;

        info!("Created comment {} on article {}", comment.id, article_id);
        self.to_response(comment).await
    }

    /// 任何创建后的更新都会标记为已编辑
    pub async fn update_comment(
        &self,
        mut comment: Comment,
        request: UpdateCommentRequest,
    ) -> Result<CommentResponse> {
        request.validate()?;

        comment.content = sanitize_html(&request.content);
        comment.is_edited = true;
        comment.updated_at = Utc::now();
        self.db.update_comment(&comment).await?;

        info!("Updated comment {}", comment.id);
        self.to_response(comment).await
    }

    pub async fn delete_comment(&self, comment: &Comment) -> Result<()> {
        if !self.db.delete_comment(&comment.id).await? {
            return Err(AppError::not_found("Comment"));
        }
        info!("Deleted comment {} and its replies", comment.id);
        Ok(())
    }

    async fn get_comment(&self, id: &str) -> Result<Comment> {
        self.db
            .get_comment(id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment"))
    }

    /// 所属文章对操作者不可见时，评论同样视为不存在
    pub async fn visible_comment(&self, actor: &Actor, id: &str) -> Result<Comment> {
        let comment = self.get_comment(id).await?;
        match self.db.get_article(&comment.article_id).await? {
            Some(article) if can_view_article(actor, &article) => Ok(comment),
            _ => Err(AppError::not_found("Comment")),
        }
    }

    pub async fn comment_detail(&self, actor: &Actor, id: &str) -> Result<CommentResponse> {
        let comment = self.visible_comment(actor, id).await?;
        self.to_response(comment).await
    }

    /// 顶层评论新的在前，回复按时间顺序嵌套
    pub async fn thread(&self, article_id: &str) -> Result<Vec<CommentThread>> {
        let comments = self.db.list_article_comments(article_id).await?;
        let responses = self.to_responses(comments).await?;

        let mut replies: HashMap<String, Vec<CommentResponse>> = HashMap::new();
        let mut top_level = Vec::new();
        for response in responses {
            match &response.parent {
                Some(parent) => replies.entry(parent.clone()).or_default().push(response),
                None => top_level.push(response),
            }
        }

        Ok(top_level
            .into_iter()
            .map(|comment| {
                let mut nested = replies.remove(&comment.id).unwrap_or_default();
                nested.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                CommentThread {
                    comment,
                    replies: nested,
                }
            })
            .collect())
    }

    /// 非 staff 只能看到已发布文章下的评论
    pub async fn list_comments(
        &self,
        actor: &Actor,
        page: PageRequest,
    ) -> Result<Paginated<CommentResponse>> {
        let (comments, total) = self
            .db
            .list_comments(!actor.is_staff(), page.offset(), page.limit())
            .await?;
        let results = self.to_responses(comments).await?;
        Ok(Paginated::new(results, total, page))
    }

    async fn to_response(&self, comment: Comment) -> Result<CommentResponse> {
        self.to_responses(vec![comment])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::internal("Comment author missing"))
    }

    async fn to_responses(&self, comments: Vec<Comment>) -> Result<Vec<CommentResponse>> {
        let ids: Vec<String> = comments.iter().map(|c| c.id.clone()).collect();
        let user_ids: Vec<String> = comments.iter().map(|c| c.user_id.clone()).collect();
        let replies = self.db.count_replies(&ids).await?;
        let authors = self.users.author_summaries(&user_ids).await?;

        Ok(comments
            .into_iter()
            .filter_map(|comment| {
                let user = authors.get(&comment.user_id)?.clone();
                Some(CommentResponse {
                    replies_count: replies.get(&comment.id).copied().unwrap_or(0),
                    id: comment.id,
                    article: comment.article_id,
                    content: comment.content,
                    created_at: comment.created_at,
                    updated_at: comment.updated_at,
                    user,
                    parent: comment.parent_id,
                    is_edited: comment.is_edited,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::article::Article;
    use crate::models::user::RegisterRequest;
    use crate::services::{auth::Argon2Hasher, database::memory::MemoryStore};
    use std::sync::Arc;

    struct Fixture {
        comments: CommentService,
        db: Database,
        alice: User,
    }

    async fn fixture() -> Fixture {
        let db: Database = Arc::new(MemoryStore::new());
        let users = UserService::new(db.clone(), Arc::new(Argon2Hasher));
        let alice = users
            .register(RegisterRequest {
                username: "alice".to_string(),
                email: "alice@x.com".to_string(),
                password: "Str0ng!Pass".to_string(),
                password_confirm: "Str0ng!Pass".to_string(),
                first_name: "Alice".to_string(),
                last_name: "Liddell".to_string(),
            })
            .await
            .unwrap();

        for id in ["a1", "a2"] {
            db.insert_article(&Article {
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
                author_id: alice.id.clone(),
                tag_ids: vec![],
            })
            .await
            .unwrap();
        }

        Fixture {
            comments: CommentService::new(db.clone(), users),
            db,
            alice,
        }
    }

    fn body(content: &str, parent: Option<&str>) -> CreateCommentRequest {
        CreateCommentRequest {
            article: None,
            content: content.to_string(),
            parent: parent.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_reply_depth_limited_to_one() {
        let f = fixture().await;
        let top = f.comments.create_comment("a1", &f.alice, body("top level", None)).await.unwrap();
        let reply = f
            .comments
            .create_comment("a1", &f.alice, body("a reply", Some(&top.id)))
            .await
            .unwrap();
        assert_eq!(reply.parent.as_deref(), Some(top.id.as_str()));

        let err = f
            .comments
            .create_comment("a1", &f.alice, body("too deep", Some(&reply.id)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_parent_must_share_article() {
        let f = fixture().await;
        let top = f.comments.create_comment("a1", &f.alice, body("top level", None)).await.unwrap();
        let err = f
            .comments
            .create_comment("a2", &f.alice, body("cross post", Some(&top.id)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);

        let err = f
            .comments
            .create_comment("a1", &f.alice, body("orphan", Some("missing")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_marks_edited_and_sanitizes() {
        let f = fixture().await;
        let created = f.comments.create_comment("a1", &f.alice, body("first", None)).await.unwrap();
        assert!(!created.is_edited);

        let comment = f.comments.get_comment(&created.id).await.unwrap();
        let updated = f
            .comments
            .update_comment(
                comment,
                UpdateCommentRequest {
                    content: "<em>fixed</em><script>x()</script>".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(updated.is_edited);
        assert_eq!(updated.content, "<em>fixed</em>");
        assert!(f.db.get_comment(&created.id).await.unwrap().unwrap().is_edited);
    }

    #[tokio::test]
    async fn test_thread_nests_replies() {
        let f = fixture().await;
        let first = f.comments.create_comment("a1", &f.alice, body("first!", None)).await.unwrap();
        f.comments
            .create_comment("a1", &f.alice, body("reply one", Some(&first.id)))
            .await
            .unwrap();
        f.comments.create_comment("a1", &f.alice, body("second", None)).await.unwrap();

        let thread = f.comments.thread("a1").await.unwrap();
        assert_eq!(thread.len(), 2);
        let first_thread = thread.iter().find(|t| t.comment.id == first.id).unwrap();
        assert_eq!(first_thread.replies.len(), 1);
        assert_eq!(first_thread.comment.replies_count, 1);
    }

    #[tokio::test]
    async fn test_delete_removes_replies() {
        let f = fixture().await;
        let top = f.comments.create_comment("a1", &f.alice, body("top level", None)).await.unwrap();
        let reply = f
            .comments
            .create_comment("a1", &f.alice, body("a reply", Some(&top.id)))
            .await
            .unwrap();

        let comment = f.comments.get_comment(&top.id).await.unwrap();
        f.comments.delete_comment(&comment).await.unwrap();
        assert!(f.comments.get_comment(&reply.id).await.is_err());
    }

    #[tokio::test]
    async fn test_comments_follow_article_visibility() {
        let f = fixture().await;
        let created = f.comments.create_comment("a1", &f.alice, body("on a1", None)).await.unwrap();

        let mut article = f.db.get_article("a1").await.unwrap().unwrap();
        article.is_published = false;
        f.db.update_article(&article).await.unwrap();

        let anonymous = Actor::Anonymous;
        let err = f.comments.comment_detail(&anonymous, &created.id).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
        let page = PageRequest::new(None, None, 10, 100);
        assert_eq!(f.comments.list_comments(&anonymous, page).await.unwrap().count, 0);

        let mut staff = f.alice.clone();
        staff.is_staff = true;
        let staff = Actor::User(staff);
        assert!(f.comments.comment_detail(&staff, &created.id).await.is_ok());
        assert_eq!(f.comments.list_comments(&staff, page).await.unwrap().count, 1);
    }
}
