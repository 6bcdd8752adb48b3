use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use validator::ValidationError;

use crate::utils::slug::{is_valid_slug, TAG_SLUG_MAX};

/// 单篇文章最多可关联的标签数
pub const MAX_TAGS_PER_ARTICLE: usize = 10;
/// 标签名最大长度
pub const MAX_TAG_NAME_LEN: usize = 50;
/// 密码最小长度
pub const MIN_PASSWORD_LEN: usize = 8;

static USERNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("valid username regex"));

static COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890",
    "qwerty123", "qwertyuiop", "iloveyou", "sunshine", "princess", "football",
    "baseball", "welcome1", "admin123", "letmein1", "trustno1", "abc12345",
    "passw0rd", "superman", "starwars", "11111111", "00000000", "monkey123",
];

/// 验证用户名格式：1-150 个字符，仅限字母、数字和 @/./+/-/_
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.trim().is_empty() {
        return Err("This field may not be blank.".to_string());
    }

    if username.chars().count() > 150 {
        return Err("Ensure this field has no more than 150 characters.".to_string());
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .to_string(),
        );
    }

    Ok(())
}

/// 密码强度策略，返回所有未满足的规则
pub fn password_policy_violations(password: &str, username: &str, email: &str) -> Vec<String> {
    let mut violations = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LEN {
        violations.push(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_PASSWORD_LEN
        ));
    }

    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        violations.push("This password is entirely numeric.".to_string());
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        violations.push("This password is too common.".to_string());
    }

    let email_local = email.split('@').next().unwrap_or_default();
    for (attribute, value) in [("username", username), ("email address", email_local)] {
        let value = value.to_lowercase();
        if value.chars().count() >= 3 && (lowered.contains(&value) || value.contains(&lowered)) {
            violations.push(format!("The password is too similar to the {}.", attribute));
            break;
        }
    }

    violations
}

/// 空字符串或合法 URL
pub fn validate_blank_or_url(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() || validator::validate_url(value) {
        Ok(())
    } else {
        let mut error = ValidationError::new("url");
        error.message = Some(Cow::Borrowed("Enter a valid URL."));
        Err(error)
    }
}

/// 标签列表：最多 10 个，每个不超过 50 个字符
pub fn validate_tag_names(tags: &[String]) -> Result<(), ValidationError> {
    if tags.len() > MAX_TAGS_PER_ARTICLE {
        let mut error = ValidationError::new("max_tags");
        error.message = Some(Cow::Owned(format!(
            "Maximum {} tags allowed",
            MAX_TAGS_PER_ARTICLE
        )));
        return Err(error);
    }

    if tags.iter().any(|t| t.trim().chars().count() > MAX_TAG_NAME_LEN) {
        let mut error = ValidationError::new("tag_length");
        error.message = Some(Cow::Owned(format!(
            "Tag names may not exceed {} characters",
            MAX_TAG_NAME_LEN
        )));
        return Err(error);
    }

    Ok(())
}

/// 客户端指定的标签 slug
pub fn validate_tag_slug(value: &str) -> Result<(), ValidationError> {
    if value.len() <= TAG_SLUG_MAX && is_valid_slug(value) {
        Ok(())
    } else {
        let mut error = ValidationError::new("invalid");
        error.message = Some(Cow::Borrowed(
            "Enter a valid \"slug\" consisting of lowercase letters, numbers, underscores or hyphens.",
        ));
        Err(error)
    }
}

/// 标签名规范化：去空白并转小写，空名返回 None
pub fn normalize_tag_name(name: &str) -> Option<String> {
    let normalized = name.trim().to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("test_user").is_ok());
        assert!(validate_username("first.last@corp+1").is_ok());

        assert!(validate_username("").is_err());
        assert!(validate_username("user name").is_err());
        assert!(validate_username("user#name").is_err());
        assert!(validate_username(&"a".repeat(151)).is_err());
    }

    #[test]
    fn test_password_policy() {
        assert!(password_policy_violations("Str0ng!Pass", "alice", "alice@x.com").is_empty());

        let short = password_policy_violations("Ab1!", "alice", "alice@x.com");
        assert_eq!(short.len(), 1);
        assert!(short[0].contains("too short"));

        let numeric = password_policy_violations("1234567890", "alice", "alice@x.com");
        assert!(numeric.iter().any(|v| v.contains("entirely numeric")));
        assert!(numeric.iter().any(|v| v.contains("too common")));

        let similar = password_policy_violations("alice2024!", "alice", "alice@x.com");
        assert!(similar.iter().any(|v| v.contains("too similar to the username")));
    }

    #[test]
    fn test_validate_blank_or_url() {
        assert!(validate_blank_or_url("").is_ok());
        assert!(validate_blank_or_url("https://alice.dev").is_ok());
        assert!(validate_blank_or_url("not a url").is_err());
    }

    #[test]
    fn test_validate_tag_names() {
        let ok: Vec<String> = (0..10).map(|i| format!("tag{}", i)).collect();
        assert!(validate_tag_names(&ok).is_ok());

        let too_many: Vec<String> = (0..11).map(|i| format!("tag{}", i)).collect();
        assert!(validate_tag_names(&too_many).is_err());

        assert!(validate_tag_names(&["x".repeat(51)]).is_err());
    }

    #[test]
    fn test_validate_tag_slug() {
        assert!(validate_tag_slug("rust-lang").is_ok());
        assert!(validate_tag_slug("web_dev2").is_ok());

        assert!(validate_tag_slug("").is_err());
        assert!(validate_tag_slug("Rust Lang").is_err());
        assert!(validate_tag_slug("-rust").is_err());
        assert!(validate_tag_slug(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_normalize_tag_name() {
        assert_eq!(normalize_tag_name("  Rust "), Some("rust".to_string()));
        assert_eq!(normalize_tag_name("   "), None);
    }
}
