//! Utility functions and helpers

use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

/// Characters `encodeURIComponent` leaves alone
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

static DYNAMIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\[[^/]+?\](?:/|$)").unwrap());

/// Clean a path by removing . and .. components
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if path.starts_with('/') {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}

/// Replace Windows separators with forward slashes
pub fn normalize_path_sep(path: &str) -> String {
    path.replace('\\', "/")
}

/// Prefix a path with `/` unless it already has one
pub fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Whether the page contains a `[param]` segment
pub fn is_dynamic_route(page: &str) -> bool {
    DYNAMIC_SEGMENT.is_match(page)
}

/// Turn a page into the path used for its bundle file.
///
/// `/` becomes `/index`, and pages that already start with an `/index`
/// segment get a second one so they cannot collide with the root index.
pub fn normalize_page_path(page: &str) -> String {
    let is_index_prefixed = page == "/index" || page.starts_with("/index/");
    if is_index_prefixed && !is_dynamic_route(page) {
        format!("/index{}", page)
    } else if page == "/" {
        "/index".to_string()
    } else {
        ensure_leading_slash(page)
    }
}

/// Strip route groups, parallel-route slots and the trailing `page`/`route`
/// segment from an app-collection path: `/(shop)/@modal/cart/page` -> `/cart`.
pub fn normalize_app_path(route: &str) -> String {
    let segments: Vec<&str> = route.split('/').collect();
    let last = segments.len().saturating_sub(1);

    let pathname = segments
        .iter()
        .enumerate()
        .fold(String::new(), |pathname, (index, segment)| {
            if segment.is_empty() || is_group_segment(segment) || segment.starts_with('@') {
                return pathname;
            }
            if (*segment == "page" || *segment == "route") && index == last {
                return pathname;
            }
            format!("{}/{}", pathname, segment)
        });

    ensure_leading_slash(&pathname)
}

/// `(name)` segments organise files without affecting the URL
pub fn is_group_segment(segment: &str) -> bool {
    segment.starts_with('(') && segment.ends_with(')')
}

/// Percent-encode every segment of a file path, keeping the separators
pub fn encode_uri_path(file: &str) -> String {
    file.split('/')
        .map(|segment| utf8_percent_encode(segment, URI_COMPONENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Format duration as human-readable string
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs >= 60.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining_secs = secs - (mins as f64 * 60.0);
        format!("{}m {:.2}s", mins, remaining_secs)
    } else if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("./foo/bar"), "foo/bar");
        assert_eq!(clean_path("foo/../bar"), "bar");
        assert_eq!(clean_path("/foo/./bar/../baz"), "/foo/baz");
    }

    #[test]
    fn test_normalize_page_path() {
        assert_eq!(normalize_page_path("/"), "/index");
        assert_eq!(normalize_page_path("/index"), "/index/index");
        assert_eq!(normalize_page_path("/index/about"), "/index/index/about");
        assert_eq!(normalize_page_path("/index/[slug]"), "/index/[slug]");
        assert_eq!(normalize_page_path("blog"), "/blog");
    }

    #[test]
    fn test_normalize_app_path() {
        assert_eq!(normalize_app_path("/(shop)/@modal/cart/page"), "/cart");
        assert_eq!(normalize_app_path("/page"), "/");
        assert_eq!(normalize_app_path("/api/users/route"), "/api/users");
        assert_eq!(normalize_app_path("/blog/page/[id]/page"), "/blog/page/[id]");
    }

    #[test]
    fn test_encode_uri_path() {
        assert_eq!(
            encode_uri_path("static/chunks/app/[slug]/page.js"),
            "static/chunks/app/%5Bslug%5D/page.js"
        );
        assert_eq!(encode_uri_path("a b/c(d).js"), "a%20b/c(d).js");
    }

    #[test]
    fn test_format_duration() {
        use std::time::Duration;

        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs_f64(1.5)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5.00s");
    }
}
