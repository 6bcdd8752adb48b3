pub mod html;
pub mod middleware;
pub mod serde_helpers;
pub mod slug;
pub mod validation;
