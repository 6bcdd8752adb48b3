pub mod articles;
pub mod auth;
pub mod bookmarks;
pub mod comments;
pub mod tags;
pub mod users;
