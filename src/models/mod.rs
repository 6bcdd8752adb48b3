pub mod article;
pub mod bookmark;
pub mod comment;
pub mod like;
pub mod response;
pub mod tag;
pub mod user;
