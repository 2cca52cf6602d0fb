//! Per-route cache declarations.

use serde::Deserialize;

/// Options a route declares for key derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Query parameters significant for the cache key. `None` keeps the
    /// default `page`/`limit`/`search` rule.
    pub query_params: Option<Vec<String>>,
}

/// Cache declaration attached to one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoute {
    resource: String,
    enabled: bool,
    options: CacheOptions,
}

impl CacheRoute {
    /// An enabled route for `resource` using the default key rule.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            enabled: true,
            options: CacheOptions::default(),
        }
    }

    pub fn with_query_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.query_params = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn query_params(&self) -> Option<&[String]> {
        self.options.query_params.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_enabled_without_declared_params() {
        let route = CacheRoute::new("ArticleController");
        assert!(route.is_enabled());
        assert_eq!(route.resource(), "ArticleController");
        assert!(route.query_params().is_none());
    }

    #[test]
    fn declared_params_keep_order() {
        let route =
            CacheRoute::new("ArticleController").with_query_params(["page", "limit", "search"]);
        assert_eq!(
            route.query_params(),
            Some(&["page".to_string(), "limit".to_string(), "search".to_string()][..])
        );
    }

    #[test]
    fn options_deserialize_from_partial_input() {
        let options: CacheOptions = serde_json::from_str("{}").expect("empty options");
        assert_eq!(options, CacheOptions::default());

        let options: CacheOptions =
            serde_json::from_str(r#"{"query_params":["page","limit"]}"#).expect("options");
        let route = CacheRoute::new("A").with_options(options).disabled();
        assert!(!route.is_enabled());
        assert_eq!(route.query_params().map(<[String]>::len), Some(2));
    }
}
