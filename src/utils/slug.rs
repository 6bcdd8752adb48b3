use once_cell::sync::Lazy;
use regex::Regex;

static VALID_SLUG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[-_][a-z0-9]+)*$").expect("valid slug regex")
});

/// 文章 slug 的最大长度
pub const ARTICLE_SLUG_MAX: usize = 250;
/// 标签 slug 的最大长度
pub const TAG_SLUG_MAX: usize = 50;

/// 从标题生成 URL 友好的 slug
pub fn generate_slug(title: &str, max_len: usize) -> String {
    let mut slug = slug::slugify(title);

    // 限制长度，尽量在连字符处截断
    if slug.len() > max_len {
        slug.truncate(max_len);
        if let Some(last_hyphen) = slug.rfind('-') {
            if last_hyphen > max_len / 2 {
                slug.truncate(last_hyphen);
            }
        }
        slug = slug.trim_end_matches('-').to_string();
    }

    if slug.is_empty() {
        slug = "untitled".to_string();
    }

    slug
}

/// 解析 `base` 或 `base-N` 形式的 slug，返回数字后缀（`base` 本身为 0）
pub fn suffix_for_base(slug: &str, base: &str) -> Option<u64> {
    if slug == base {
        return Some(0);
    }
    slug.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('-'))
        .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) && !n.starts_with('0'))
        .and_then(|n| n.parse::<u64>().ok())
}

/// 在已占用的 slug 中为 `base` 选择下一个可用值
///
/// `base` 空闲时直接使用；否则后缀取当前最大后缀加一。
pub fn next_available_slug(base: &str, existing: &[String]) -> String {
    let used: Vec<u64> = existing
        .iter()
        .filter_map(|slug| suffix_for_base(slug, base))
        .collect();

    if !used.contains(&0) {
        return base.to_string();
    }

    let next = used.iter().copied().max().unwrap_or(0) + 1;
    format!("{}-{}", base, next)
}

/// 验证 slug 格式是否正确
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.len() <= ARTICLE_SLUG_MAX && VALID_SLUG_REGEX.is_match(slug)
}
