//! Where the progress endpoint lives relative to the server origin.
//!
//! Behind a reverse proxy the whole app may be mounted under a prefix such as
//! `/api/hassio_ingress/<token>`, so the stream path cannot be hardcoded. Resolvers
//! are tried in order and the first one with an answer wins; with none, the root
//! path is used.

pub const ROOT_PATH: &str = "/";

pub trait BasePathResolver: Send + Sync {
    fn resolve(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct StaticBasePath(pub String);

impl BasePathResolver for StaticBasePath {
    fn resolve(&self) -> Option<String> {
        non_empty(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct EnvBasePath {
    pub var: String,
}

impl EnvBasePath {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl BasePathResolver for EnvBasePath {
    fn resolve(&self) -> Option<String> {
        std::env::var(&self.var).ok().as_deref().and_then(non_empty)
    }
}

/// Detects a proxy prefix inside the path the client was reached at.
///
/// Everything up to and including the segment after `marker` is the prefix, so
/// `/api/hassio_ingress/abc/history` with marker `hassio_ingress` gives
/// `/api/hassio_ingress/abc`.
#[derive(Debug, Clone)]
pub struct ProxyPrefixDetector {
    pub location: String,
    pub marker: String,
}

impl ProxyPrefixDetector {
    pub fn new(location: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            marker: marker.into(),
        }
    }
}

impl BasePathResolver for ProxyPrefixDetector {
    fn resolve(&self) -> Option<String> {
        let segments: Vec<&str> = self
            .location
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        let marker_at = segments.iter().position(|s| *s == self.marker)?;
        let token = segments.get(marker_at + 1)?;
        let mut prefix = segments[..=marker_at].join("/");
        prefix.push('/');
        prefix.push_str(token);
        non_empty(&prefix)
    }
}

pub fn resolve_base_path(resolvers: &[Box<dyn BasePathResolver>]) -> String {
    resolvers
        .iter()
        .find_map(|resolver| resolver.resolve())
        .unwrap_or_else(|| ROOT_PATH.to_string())
}

/// Joins origin, base path and endpoint path without doubled or missing slashes.
pub fn endpoint_url(origin: &str, base_path: &str, endpoint: &str) -> String {
    let origin = origin.trim_end_matches('/');
    let base = base_path.trim_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    if base.is_empty() {
        format!("{origin}/{endpoint}")
    } else {
        format!("{origin}/{base}/{endpoint}")
    }
}

fn non_empty(path: &str) -> Option<String> {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_root() {
        let resolvers: Vec<Box<dyn BasePathResolver>> = vec![
            Box::new(StaticBasePath(String::new())),
            Box::new(StaticBasePath("/".into())),
            Box::new(ProxyPrefixDetector::new("/dashboard", "hassio_ingress")),
        ];
        assert_eq!(resolve_base_path(&resolvers), ROOT_PATH);
        assert_eq!(resolve_base_path(&[]), ROOT_PATH);
    }

    #[test]
    fn first_resolver_with_answer_wins() {
        let resolvers: Vec<Box<dyn BasePathResolver>> = vec![
            Box::new(StaticBasePath("".into())),
            Box::new(StaticBasePath("speed/".into())),
            Box::new(StaticBasePath("/other".into())),
        ];
        assert_eq!(resolve_base_path(&resolvers), "/speed");
    }

    #[test]
    fn detects_proxy_prefix() {
        let detector =
            ProxyPrefixDetector::new("/api/hassio_ingress/x1Yz/history/42", "hassio_ingress");
        assert_eq!(detector.resolve().as_deref(), Some("/api/hassio_ingress/x1Yz"));

        let no_token = ProxyPrefixDetector::new("/api/hassio_ingress/", "hassio_ingress");
        assert_eq!(no_token.resolve(), None);
    }

    #[test]
    fn unset_env_var_yields_nothing() {
        let resolver = EnvBasePath::new("ERICSPEED_TEST_UNSET_BASE_PATH_VAR");
        assert_eq!(resolver.resolve(), None);
    }

    #[test]
    fn joins_endpoint_url() {
        assert_eq!(
            endpoint_url("http://host:8080/", "/", "/api/speedtest/stream"),
            "http://host:8080/api/speedtest/stream"
        );
        assert_eq!(
            endpoint_url("http://host", "/api/hassio_ingress/abc/", "api/speedtest/stream"),
            "http://host/api/hassio_ingress/abc/api/speedtest/stream"
        );
    }
}
