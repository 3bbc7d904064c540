//! The view seam shared by model views and file admins, plus access control.

use crate::error::AppError;
use crate::naming::endpoint_for;
use crate::settings::AdminSettings;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Name, endpoint and mount point of a registered view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ViewMeta {
    pub name: String,
    pub endpoint: String,
    /// Absolute mount path without trailing slash (e.g. `/admin/post`).
    pub url: String,
    pub category: Option<String>,
}

impl ViewMeta {
    /// Endpoint defaults to the snake-cased name. A relative `url` is mounted under the admin
    /// prefix; an absolute one is used as is.
    pub fn new(
        settings: &AdminSettings,
        name: &str,
        endpoint: Option<&str>,
        url: Option<&str>,
        category: Option<&str>,
    ) -> Self {
        let endpoint = endpoint
            .map(str::to_string)
            .unwrap_or_else(|| endpoint_for(name));
        let url = match url {
            Some(u) if u.starts_with('/') => u.trim_end_matches('/').to_string(),
            Some(u) => format!("{}/{}", settings.url_prefix, u.trim_matches('/')),
            None => format!("{}/{}", settings.url_prefix, endpoint),
        };
        ViewMeta {
            name: name.to_string(),
            endpoint,
            url,
            category: category.map(str::to_string),
        }
    }

    /// The view's index url (with trailing slash).
    pub fn index_url(&self) -> String {
        format!("{}/", self.url)
    }
}

/// A routable admin view.
pub trait AdminView: Send + Sync {
    fn meta(&self) -> &ViewMeta;

    /// Routes at absolute paths under `meta().url`.
    fn router(self: Arc<Self>) -> Router;
}

/// Decides whether the current request may use a view. Inaccessible views answer 403 and are
/// left out of the menu.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn is_accessible(&self, view: &ViewMeta, parts: &Parts) -> bool;
}

pub struct AllowAll;

#[async_trait]
impl AccessPolicy for AllowAll {
    async fn is_accessible(&self, _view: &ViewMeta, _parts: &Parts) -> bool {
        true
    }
}

#[derive(Clone)]
pub(crate) struct AccessGuard {
    pub meta: ViewMeta,
    pub policy: Arc<dyn AccessPolicy>,
}

pub(crate) async fn check_access(State(guard): State<AccessGuard>, req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    if !guard.policy.is_accessible(&guard.meta, &parts).await {
        tracing::info!(view = %guard.meta.endpoint, path = %parts.uri.path(), "access denied");
        return AppError::Forbidden.into_response();
    }
    next.run(Request::from_parts(parts, body)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mounts_under_prefix() {
        let settings = AdminSettings::default();
        let meta = ViewMeta::new(&settings, "Blog Post", None, None, Some("Blog"));
        assert_eq!(meta.endpoint, "blog_post");
        assert_eq!(meta.url, "/admin/blog_post");
        assert_eq!(meta.index_url(), "/admin/blog_post/");

        let rel = ViewMeta::new(&settings, "Files", Some("files"), Some("static/"), None);
        assert_eq!(rel.url, "/admin/static");
        let abs = ViewMeta::new(&settings, "Files", Some("files"), Some("/files/"), None);
        assert_eq!(abs.url, "/files");
    }
}
