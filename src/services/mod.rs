pub mod article;
pub mod auth;
pub mod bookmark;
pub mod comment;
pub mod database;
pub mod like;
pub mod permission;
pub mod query;
pub mod tag;
pub mod user;

// 重新导出常用类型
pub use article::ArticleService;
pub use auth::AuthService;
pub use bookmark::BookmarkService;
pub use comment::CommentService;
pub use database::Database;
pub use like::LikeService;
pub use tag::TagService;
pub use user::UserService;
