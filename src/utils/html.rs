use ammonia::Builder;
use maplit::{hashmap, hashset};
use std::collections::HashSet;

/// 自动摘要的截断阈值（字符数）
pub const EXCERPT_THRESHOLD: usize = 300;
const EXCERPT_PREFIX: usize = EXCERPT_THRESHOLD - 3;
const WORDS_PER_MINUTE: usize = 200;

fn get_sanitizer() -> Builder<'static> {
    let mut sanitizer = Builder::default();

    // 允许的标签
    sanitizer.tags(hashset![
        "p", "br", "strong", "em", "u",
        "h1", "h2", "h3", "h4", "h5", "h6",
        "ul", "ol", "li",
        "blockquote", "code", "pre",
        "a", "img",
    ]);

    // 只保留白名单属性，rel 等由我们自己控制
    sanitizer.tag_attributes(hashmap![
        "a" => hashset!["href", "title", "target"],
        "img" => hashset!["src", "alt", "title", "width", "height"],
    ]);
    sanitizer.generic_attributes(HashSet::new());
    sanitizer.link_rel(None);

    sanitizer
}

/// 清理用户提交的 HTML，去掉白名单以外的标签、属性和脚本
pub fn sanitize_html(content: &str) -> String {
    get_sanitizer().clean(content).to_string()
}

/// 生成文章摘要：超过阈值时截取前 297 个字符并追加省略号，否则为空
pub fn derive_excerpt(content: &str) -> String {
    if content.chars().count() > EXCERPT_THRESHOLD {
        let prefix: String = content.chars().take(EXCERPT_PREFIX).collect();
        format!("{}...", prefix)
    } else {
        String::new()
    }
}

/// 估算阅读时间（分钟），至少 1 分钟
pub fn estimate_read_time(content: &str) -> u32 {
    let words = content.split_whitespace().count();
    (words / WORDS_PER_MINUTE).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_scripts_and_event_handlers() {
        let dirty = r#"<p onclick="steal()">Hello<script>alert(1)</script> <b>world</b></p>"#;
        let clean = sanitize_html(dirty);
        assert_eq!(clean, "<p>Hello world</p>");
    }

    #[test]
    fn test_keeps_allowed_link_and_image_attributes() {
        let clean = sanitize_html(
            r#"<a href="https://example.com" title="t" target="_blank" class="x">go</a><img src="/a.png" alt="a" style="color:red">"#,
        );
        assert!(clean.contains(r#"href="https://example.com""#));
        assert!(clean.contains(r#"target="_blank""#));
        assert!(clean.contains(r#"alt="a""#));
        assert!(!clean.contains("class"));
        assert!(!clean.contains("style"));
        assert!(!clean.contains("rel="));
    }

    #[test]
    fn test_drops_javascript_urls() {
        let clean = sanitize_html(r#"<a href="javascript:alert(1)">x</a>"#);
        assert!(!clean.contains("javascript"));
    }

    #[test]
    fn test_headings_and_lists_survive() {
        let html = "<h2>Title</h2><ul><li>one</li></ul><blockquote>q</blockquote><pre><code>x</code></pre>";
        assert_eq!(sanitize_html(html), html);
    }

    #[test]
    fn test_excerpt_short_content_is_not_derived() {
        let content = "a".repeat(EXCERPT_THRESHOLD);
        assert_eq!(derive_excerpt(&content), "");
    }

    #[test]
    fn test_excerpt_long_content_is_truncated() {
        let content = "é".repeat(EXCERPT_THRESHOLD + 1);
        let excerpt = derive_excerpt(&content);
        assert_eq!(excerpt.chars().count(), EXCERPT_THRESHOLD);
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.starts_with(&"é".repeat(EXCERPT_PREFIX)));
    }

    #[test]
    fn test_read_time() {
        assert_eq!(estimate_read_time("short"), 1);
        assert_eq!(estimate_read_time(&"word ".repeat(450)), 2);
    }

    fn fragment() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-zA-Z0-9 .,&]{0,20}",
            Just("<p>para</p>".to_string()),
            Just("<script>alert('x')</script>".to_string()),
            Just("<em>em</em>".to_string()),
            Just("<strong>bold</strong>".to_string()),
            Just(r#"<a href="/x" onclick="y()">link</a>"#.to_string()),
            Just(r#"<img src="a.png" onerror="x()">"#.to_string()),
            Just(r#"<div class="c">div</div>"#.to_string()),
            Just("<h3>head</h3>".to_string()),
            Just("<ul><li>item</li></ul>".to_string()),
            Just("<style>p{}</style>".to_string()),
        ]
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(parts in proptest::collection::vec(fragment(), 0..8)) {
            let input = parts.concat();
            let once = sanitize_html(&input);
            let twice = sanitize_html(&once);
            prop_assert_eq!(&once, &twice);
            prop_assert!(!once.contains("<script"));
            prop_assert!(!once.contains("onclick"));
            prop_assert!(!once.contains("onerror"));
        }
    }
}
