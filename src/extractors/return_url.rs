//! Extract the `url` query argument when it is safe to redirect to.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use url::Url;

/// The `url` query argument, kept only when it is relative or points at the request host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReturnUrl(pub Option<String>);

impl ReturnUrl {
    /// The safe return url, or `default`.
    pub fn or(&self, default: &str) -> String {
        self.0.clone().unwrap_or_else(|| default.to_string())
    }
}

/// A target is safe when, resolved against the current host, it stays on that host over http(s).
pub fn is_safe_url(target: &str, host: &str) -> bool {
    let target = target.trim();
    if target.is_empty() || target.contains('\\') {
        return false;
    }
    let Ok(base) = Url::parse(&format!("http://{}/", host)) else {
        return false;
    };
    match base.join(target) {
        Ok(resolved) => {
            matches!(resolved.scheme(), "http" | "https")
                && resolved.host_str() == base.host_str()
                && resolved.port() == base.port()
        }
        Err(_) => false,
    }
}

fn query_arg(query: &str, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[async_trait]
impl<S> FromRequestParts<S> for ReturnUrl
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let target = parts
            .uri
            .query()
            .and_then(|q| query_arg(q, "url"))
            .filter(|u| is_safe_url(u, host));
        Ok(ReturnUrl(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_and_same_host_are_safe() {
        assert!(is_safe_url("/admin/post/?page=2", "example.com"));
        assert!(is_safe_url("http://example.com/admin/", "example.com"));
        assert!(is_safe_url("https://example.com/admin/", "example.com"));
    }

    #[test]
    fn other_hosts_and_schemes_are_not() {
        assert!(!is_safe_url("http://evil.com/", "example.com"));
        assert!(!is_safe_url("//evil.com/x", "example.com"));
        assert!(!is_safe_url("javascript:alert(1)", "example.com"));
        assert!(!is_safe_url("/\\evil.com", "example.com"));
        assert!(!is_safe_url("", "example.com"));
    }

    #[test]
    fn reads_url_argument() {
        assert_eq!(query_arg("page=1&url=%2Fadmin%2F", "url").as_deref(), Some("/admin/"));
        assert_eq!(query_arg("page=1", "url"), None);
    }
}
