use std::sync::Arc;

use crate::{
    config::Config,
    error::Result,
    models::response::PageRequest,
    services::{
        auth::{Argon2Hasher, PasswordHasher},
        database::{self, Database},
        ArticleService, AuthService, BookmarkService, CommentService, LikeService, TagService,
        UserService,
    },
};

/// 应用程序的共享状态
/// 包含所有服务和配置的引用
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 数据库连接
    pub db: Database,

    /// 认证服务
    pub auth_service: AuthService,

    /// 用户服务
    pub user_service: UserService,

    /// 文章服务
    pub article_service: ArticleService,

    /// 评论服务
    pub comment_service: CommentService,

    /// 标签服务
    pub tag_service: TagService,

    /// 点赞服务
    pub like_service: LikeService,

    /// 书签服务
    pub bookmark_service: BookmarkService,
}

impl AppState {
    /// 连接存储并装配所有服务
    pub async fn new(config: Config) -> Result<Self> {
        let db = database::connect(&config).await?;
        Ok(Self::with_database(config, db))
    }

    pub fn with_database(config: Config, db: Database) -> Self {
        let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2Hasher);

        let auth_service = AuthService::new(db.clone(), hasher.clone(), &config);
        let user_service = UserService::new(db.clone(), hasher);
        let tag_service = TagService::new(db.clone());
        let article_service =
            ArticleService::new(db.clone(), tag_service.clone(), user_service.clone(), &config);
        let comment_service = CommentService::new(db.clone(), user_service.clone());
        let like_service = LikeService::new(db.clone(), user_service.clone());
        let bookmark_service = BookmarkService::new(db.clone(), article_service.clone());

        Self {
            config,
            db,
            auth_service,
            user_service,
            article_service,
            comment_service,
            tag_service,
            like_service,
            bookmark_service,
        }
    }

    /// 获取分页配置
    pub fn page(&self, page: Option<usize>, page_size: Option<usize>) -> PageRequest {
        PageRequest::new(
            page,
            page_size,
            self.config.default_page_size,
            self.config.max_page_size,
        )
    }
}
