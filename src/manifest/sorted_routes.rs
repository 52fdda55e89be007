//! Route specificity ordering
//!
//! Routes are inserted into a trie of URL segments and read back so that
//! static segments come before `[param]`, which comes before `[...rest]`
//! and `[[...optional]]`. Conflicting dynamic segments are rejected.

use std::collections::BTreeMap;

use crate::error::{BuildError, BuildResult};

const SLUG: &str = "[]";
const REST_SLUG: &str = "[...]";
const OPTIONAL_REST_SLUG: &str = "[[...]]";

#[derive(Debug)]
struct UrlNode {
    /// Only an intermediate segment, not a route of its own
    placeholder: bool,
    children: BTreeMap<String, UrlNode>,
    slug_name: Option<String>,
    rest_slug_name: Option<String>,
    optional_rest_slug_name: Option<String>,
}

impl Default for UrlNode {
    fn default() -> Self {
        Self {
            placeholder: true,
            children: BTreeMap::new(),
            slug_name: None,
            rest_slug_name: None,
            optional_rest_slug_name: None,
        }
    }
}

fn conflict(route: &str, message: String) -> BuildError {
    BuildError::conflict(route, message)
}

/// Record a slug name for this level, rejecting a different name at the
/// same level and repeats along one path
fn handle_slug(
    route: &str,
    previous: &Option<String>,
    next: &str,
    slug_names: &mut Vec<String>,
) -> BuildResult<()> {
    if let Some(previous) = previous {
        if previous != next {
            return Err(conflict(
                route,
                format!(
                    "You cannot use different slug names for the same dynamic path ('{}' !== '{}').",
                    previous, next
                ),
            ));
        }
    }

    let word_only = |s: &str| s.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect::<String>();
    for slug in slug_names.iter() {
        if slug == next {
            return Err(conflict(
                route,
                format!("You cannot have the same slug name \"{}\" repeat within a single dynamic path", next),
            ));
        }
        if word_only(slug) == word_only(next) {
            return Err(conflict(
                route,
                format!(
                    "You cannot have the slug names \"{}\" and \"{}\" differ only by non-word symbols within a single dynamic path",
                    slug, next
                ),
            ));
        }
    }

    slug_names.push(next.to_string());
    Ok(())
}

impl UrlNode {
    fn insert(&mut self, route: &str) -> BuildResult<()> {
        let segments: Vec<&str> = route.split('/').filter(|s| !s.is_empty()).collect();
        self.insert_segments(route, &segments, &mut Vec::new(), false)
    }

    fn insert_segments(
        &mut self,
        route: &str,
        segments: &[&str],
        slug_names: &mut Vec<String>,
        is_catch_all: bool,
    ) -> BuildResult<()> {
        let Some((&segment, rest)) = segments.split_first() else {
            self.placeholder = false;
            return Ok(());
        };
        if is_catch_all {
            return Err(conflict(route, "Catch-all must be the last part of the URL.".to_string()));
        }

        let mut key = segment.to_string();
        let mut is_catch_all = false;
        if let Some(inner) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let (mut name, is_optional) = match inner.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                Some(name) => (name, true),
                None => (inner, false),
            };

            if name.starts_with('…') {
                return Err(conflict(
                    route,
                    format!("Detected a three-dot character ('…') at ('{}'). Did you mean ('...')?", name),
                ));
            }
            if let Some(rest_name) = name.strip_prefix("...") {
                name = rest_name;
                is_catch_all = true;
            }
            if name.starts_with('[') || name.ends_with(']') {
                return Err(conflict(
                    route,
                    format!("Segment names may not start or end with extra brackets ('{}').", name),
                ));
            }
            if name.starts_with('.') {
                return Err(conflict(
                    route,
                    format!("Segment names may not start with erroneous periods ('{}').", name),
                ));
            }

            if is_catch_all && is_optional {
                if let Some(rest) = &self.rest_slug_name {
                    return Err(conflict(
                        route,
                        format!(
                            "You cannot use both an required and optional catch-all route at the same level (\"[...{}]\" and \"{}\" ).",
                            rest, segment
                        ),
                    ));
                }
                handle_slug(route, &self.optional_rest_slug_name, name, slug_names)?;
                self.optional_rest_slug_name = Some(name.to_string());
                key = OPTIONAL_REST_SLUG.to_string();
            } else if is_catch_all {
                if let Some(optional) = &self.optional_rest_slug_name {
                    return Err(conflict(
                        route,
                        format!(
                            "You cannot use both an optional and required catch-all route at the same level (\"[[...{}]]\" and \"{}\").",
                            optional, segment
                        ),
                    ));
                }
                handle_slug(route, &self.rest_slug_name, name, slug_names)?;
                self.rest_slug_name = Some(name.to_string());
                key = REST_SLUG.to_string();
            } else {
                if is_optional {
                    return Err(conflict(
                        route,
                        format!("Optional route parameters are not yet supported (\"{}\").", segment),
                    ));
                }
                handle_slug(route, &self.slug_name, name, slug_names)?;
                self.slug_name = Some(name.to_string());
                key = SLUG.to_string();
            }
        }

        self.children
            .entry(key)
            .or_default()
            .insert_segments(route, rest, slug_names, is_catch_all)
    }

    fn smoosh(&self, prefix: &str) -> BuildResult<Vec<String>> {
        let mut routes = Vec::new();
        for (segment, child) in &self.children {
            if [SLUG, REST_SLUG, OPTIONAL_REST_SLUG].contains(&segment.as_str()) {
                continue;
            }
            routes.extend(child.smoosh(&format!("{}{}/", prefix, segment))?);
        }

        if let (Some(name), Some(child)) = (&self.slug_name, self.children.get(SLUG)) {
            routes.extend(child.smoosh(&format!("{}[{}]/", prefix, name))?);
        }

        if !self.placeholder {
            let route = if prefix == "/" {
                "/".to_string()
            } else {
                prefix[..prefix.len() - 1].to_string()
            };
            if let Some(optional) = &self.optional_rest_slug_name {
                return Err(conflict(
                    &route,
                    format!(
                        "You cannot define a route with the same specificity as a optional catch-all route (\"{}\" and \"{}[[...{}]]\").",
                        route, route, optional
                    ),
                ));
            }
            routes.insert(0, route);
        }

        if let (Some(name), Some(child)) = (&self.rest_slug_name, self.children.get(REST_SLUG)) {
            routes.extend(child.smoosh(&format!("{}[...{}]/", prefix, name))?);
        }
        if let (Some(name), Some(child)) = (&self.optional_rest_slug_name, self.children.get(OPTIONAL_REST_SLUG)) {
            routes.extend(child.smoosh(&format!("{}[[...{}]]/", prefix, name))?);
        }

        Ok(routes)
    }
}

/// Routes from most to least specific
pub fn sorted_routes<I, S>(routes: I) -> BuildResult<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut root = UrlNode::default();
    for route in routes {
        root.insert(route.as_ref())?;
    }
    root.smoosh("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_static_before_dynamic() {
        let sorted = sorted_routes([
            "/[...slug]",
            "/blog/[id]",
            "/",
            "/blog/[id]/comments",
            "/blog/new",
            "/about",
            "/docs/[[...path]]",
        ])
        .unwrap();
        assert_eq!(
            sorted,
            vec![
                "/",
                "/about",
                "/blog/new",
                "/blog/[id]",
                "/blog/[id]/comments",
                "/docs/[[...path]]",
                "/[...slug]",
            ]
        );
    }

    #[test]
    fn test_conflicting_slug_names() {
        let err = sorted_routes(["/blog/[id]", "/blog/[slug]/edit"]).unwrap_err();
        assert!(err.to_string().contains("different slug names"), "{}", err);
    }

    #[test]
    fn test_rejected_segments() {
        for (routes, message) in [
            (vec!["/[...a]/b"], "Catch-all must be the last part"),
            (vec!["/[id]/[id]"], "repeat within a single dynamic path"),
            (vec!["/[[id]]"], "Optional route parameters"),
            (vec!["/docs", "/docs/[[...path]]"], "same specificity as a optional catch-all"),
            (vec!["/[...a]", "/[[...a]]"], "both an required and optional"),
        ] {
            let err = sorted_routes(routes).unwrap_err();
            assert!(err.to_string().contains(message), "{}", err);
        }
    }
}
