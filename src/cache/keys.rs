//! Cache key derivation.
//!
//! Keys are plain strings so they can be shared with any key-value backend:
//!
//! - `single:<Resource>:<id>` when the route carries an `id` path parameter
//! - `paginated:<Resource>:page-<p>:limit-<l>[:search-<s>]` for paginated GETs
//! - `<Resource>` otherwise
//!
//! Namespacing is applied by the stores, never by [`derive_key`].

use std::collections::BTreeMap;
use std::fmt;

use axum::http::Method;

/// Path or query parameters of a request, keyed by name.
pub type Params = BTreeMap<String, String>;

const SINGLE_PREFIX: &str = "single";
const PAGINATED_PREFIX: &str = "paginated";

const ID_PARAM: &str = "id";
const PAGE_PARAM: &str = "page";
const LIMIT_PARAM: &str = "limit";
const SEARCH_PARAM: &str = "search";

/// Identifies one cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already-derived key string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key of a single resource instance.
    pub fn single(resource: &str, id: &str) -> Self {
        Self(format!("{SINGLE_PREFIX}:{resource}:{id}"))
    }

    /// Bare resource key, used when no recognised parameters are present.
    pub fn resource(resource: &str) -> Self {
        Self(resource.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Scan pattern matching every paginated-list key of `resource`.
pub fn paginated_pattern(resource: &str) -> String {
    format!("{PAGINATED_PREFIX}:{resource}:*")
}

/// Scan pattern matching every single-item key of `resource`.
pub fn single_pattern(resource: &str) -> String {
    format!("{SINGLE_PREFIX}:{resource}:*")
}

/// Store-wide prefix isolating one application's keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self(namespace.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix a key or pattern with the namespace.
    pub fn qualify(&self, key: &str) -> String {
        format!("{}:{key}", self.0)
    }

    /// Remove the namespace from a qualified key, if it carries it.
    pub fn strip<'a>(&self, qualified: &'a str) -> Option<&'a str> {
        qualified
            .strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
    }
}

/// Derive the cache key for a request.
///
/// `significant` is the route's declared query parameter list. When present,
/// only declared parameters take part in derivation, and declared names
/// beyond `page`/`limit`/`search` extend paginated keys in declared order.
///
/// The single-item rule wraps whatever the paginated rule produced, so a
/// request carrying both yields `single:paginated:...:<id>`.
pub fn derive_key(
    resource: &str,
    method: &Method,
    path_params: &Params,
    query: &Params,
    significant: Option<&[String]>,
) -> CacheKey {
    let query_value = |name: &str| significant_query_value(query, significant, name);

    let mut key = resource.to_string();

    if is_method(method, &Method::GET)
        && let (Some(page), Some(limit)) = (query_value(PAGE_PARAM), query_value(LIMIT_PARAM))
    {
        key = format!("{PAGINATED_PREFIX}:{key}:page-{page}:limit-{limit}");

        if let Some(search) = query_value(SEARCH_PARAM) {
            key.push_str(&format!(":search-{search}"));
        }

        for name in significant.unwrap_or_default() {
            if matches!(name.as_str(), PAGE_PARAM | LIMIT_PARAM | SEARCH_PARAM) {
                continue;
            }
            if let Some(value) = query_value(name) {
                key.push_str(&format!(":{name}-{value}"));
            }
        }
    }

    if let Some(id) = present(path_params.get(ID_PARAM)) {
        key = format!("{SINGLE_PREFIX}:{key}:{id}");
    }

    CacheKey(key)
}

/// Case-insensitive method comparison.
pub fn is_method(method: &Method, expected: &Method) -> bool {
    method.as_str().eq_ignore_ascii_case(expected.as_str())
}

fn significant_query_value<'a>(
    query: &'a Params,
    significant: Option<&[String]>,
    name: &str,
) -> Option<&'a str> {
    if let Some(declared) = significant
        && !declared.iter().any(|candidate| candidate == name)
    {
        return None;
    }
    present(query.get(name))
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|value| !value.is_empty())
}

/// Match `candidate` against a glob pattern supporting `*` and `?`.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.as_bytes();
    let candidate = candidate.as_bytes();

    let (mut p, mut c) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, c));
                p += 1;
            }
            Some(&expected) if expected == b'?' || expected == candidate[c] => {
                p += 1;
                c += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    c = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|byte| *byte == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn declared(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn single_item_key_ignores_query() {
        let key = derive_key(
            "Article",
            &Method::GET,
            &params(&[("id", "7")]),
            &params(&[("search", "rust")]),
            None,
        );
        assert_eq!(key.as_str(), "single:Article:7");
    }

    #[test]
    fn paginated_key_shape() {
        let key = derive_key(
            "ArticleController",
            &Method::GET,
            &Params::new(),
            &params(&[("page", "0"), ("limit", "10")]),
            None,
        );
        assert_eq!(key.as_str(), "paginated:ArticleController:page-0:limit-10");
    }

    #[test]
    fn paginated_key_with_search_suffix() {
        let key = derive_key(
            "Article",
            &Method::GET,
            &Params::new(),
            &params(&[("page", "2"), ("limit", "5"), ("search", "tokio")]),
            None,
        );
        assert_eq!(key.as_str(), "paginated:Article:page-2:limit-5:search-tokio");
    }

    #[test]
    fn pagination_requires_both_page_and_limit() {
        let key = derive_key(
            "Article",
            &Method::GET,
            &Params::new(),
            &params(&[("page", "1")]),
            None,
        );
        assert_eq!(key.as_str(), "Article");
    }

    #[test]
    fn empty_values_count_as_absent() {
        let key = derive_key(
            "Article",
            &Method::GET,
            &params(&[("id", "")]),
            &params(&[("page", ""), ("limit", "10")]),
            None,
        );
        assert_eq!(key.as_str(), "Article");
    }

    #[test]
    fn pagination_only_applies_to_get() {
        let key = derive_key(
            "Article",
            &Method::POST,
            &Params::new(),
            &params(&[("page", "0"), ("limit", "10")]),
            None,
        );
        assert_eq!(key.as_str(), "Article");
    }

    #[test]
    fn method_comparison_is_case_insensitive() {
        let lower = Method::from_bytes(b"get").expect("valid method token");
        let key = derive_key(
            "Article",
            &lower,
            &Params::new(),
            &params(&[("page", "0"), ("limit", "10")]),
            None,
        );
        assert_eq!(key.as_str(), "paginated:Article:page-0:limit-10");
    }

    #[test]
    fn single_rule_wraps_paginated_rule() {
        let key = derive_key(
            "Article",
            &Method::GET,
            &params(&[("id", "3")]),
            &params(&[("page", "0"), ("limit", "10")]),
            None,
        );
        assert_eq!(key.as_str(), "single:paginated:Article:page-0:limit-10:3");
    }

    #[test]
    fn derivation_is_deterministic() {
        let query = params(&[("limit", "10"), ("page", "1"), ("search", "x")]);
        let first = derive_key("Article", &Method::GET, &Params::new(), &query, None);
        let second = derive_key("Article", &Method::GET, &Params::new(), &query, None);
        assert_eq!(first, second);
    }

    #[test]
    fn undeclared_query_params_are_ignored() {
        let names = declared(&["page", "limit"]);
        let key = derive_key(
            "Article",
            &Method::GET,
            &Params::new(),
            &params(&[("page", "0"), ("limit", "10"), ("search", "ignored")]),
            Some(&names),
        );
        assert_eq!(key.as_str(), "paginated:Article:page-0:limit-10");
    }

    #[test]
    fn extra_declared_params_extend_paginated_key_in_order() {
        let names = declared(&["page", "limit", "search", "tag", "author"]);
        let key = derive_key(
            "Article",
            &Method::GET,
            &Params::new(),
            &params(&[
                ("author", "ada"),
                ("limit", "10"),
                ("page", "0"),
                ("tag", "rust"),
            ]),
            Some(&names),
        );
        assert_eq!(
            key.as_str(),
            "paginated:Article:page-0:limit-10:tag-rust:author-ada"
        );
    }

    #[test]
    fn namespace_qualifies_and_strips() {
        let namespace = Namespace::new("app");
        assert_eq!(namespace.qualify("single:Article:1"), "app:single:Article:1");
        assert_eq!(namespace.strip("app:single:Article:1"), Some("single:Article:1"));
        assert_eq!(namespace.strip("application:single"), None);
        assert_eq!(namespace.strip("other:single:Article:1"), None);
    }

    #[test]
    fn patterns_cover_resource_keys() {
        assert_eq!(paginated_pattern("Article"), "paginated:Article:*");
        assert!(glob_match(
            &paginated_pattern("Article"),
            "paginated:Article:page-0:limit-10"
        ));
        assert!(!glob_match(
            &paginated_pattern("Article"),
            "paginated:ArticleDraft:page-0:limit-10"
        ));
        assert!(glob_match(&single_pattern("Article"), "single:Article:42"));
    }

    #[test]
    fn glob_match_handles_wildcards() {
        assert!(glob_match("*", ""));
        assert!(glob_match("a*c", "abbbc"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("*:limit-*", "paginated:A:page-0:limit-10"));
        assert!(!glob_match("abc", "abcd"));
    }
}
