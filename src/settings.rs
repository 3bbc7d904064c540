//! Admin-wide settings from the environment, and tracing setup.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_UPLOAD_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AdminSettings {
    /// Mount point of the admin, without trailing slash (e.g. `/admin`).
    pub url_prefix: String,
    pub name: String,
    /// Re-raise backend errors as 500 instead of flashing them.
    pub debug: bool,
    /// Maximum request body size for file uploads, in bytes.
    pub upload_limit: usize,
    pub default_page_size: u32,
}

impl Default for AdminSettings {
    fn default() -> Self {
        AdminSettings {
            url_prefix: "/admin".into(),
            name: "Admin".into(),
            debug: false,
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            default_page_size: 20,
        }
    }
}

impl AdminSettings {
    /// Read `ADMIN_URL`, `ADMIN_NAME`, `ADMIN_DEBUG`, `ADMIN_UPLOAD_LIMIT`, `ADMIN_PAGE_SIZE`.
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = AdminSettings::default();
        let parsed = |key: &str| get(key).and_then(|v| v.trim().parse::<u64>().ok());
        AdminSettings {
            url_prefix: get("ADMIN_URL")
                .map(|u| normalize_prefix(&u))
                .unwrap_or(defaults.url_prefix),
            name: get("ADMIN_NAME").filter(|n| !n.is_empty()).unwrap_or(defaults.name),
            debug: get("ADMIN_DEBUG")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.debug),
            upload_limit: parsed("ADMIN_UPLOAD_LIMIT")
                .map(|n| n as usize)
                .unwrap_or(defaults.upload_limit),
            default_page_size: parsed("ADMIN_PAGE_SIZE")
                .filter(|n| *n > 0)
                .map(|n| n as u32)
                .unwrap_or(defaults.default_page_size),
        }
    }
}

/// `admin/` -> `/admin`; `/` -> empty (admin mounted at the root).
fn normalize_prefix(url: &str) -> String {
    let trimmed = url.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_directive`.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn reads_overrides_and_keeps_defaults() {
        let env: HashMap<&str, &str> = [("ADMIN_URL", "manage/"), ("ADMIN_DEBUG", "true"), ("ADMIN_PAGE_SIZE", "x")]
            .into_iter()
            .collect();
        let s = AdminSettings::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(s.url_prefix, "/manage");
        assert!(s.debug);
        assert_eq!(s.default_page_size, 20);
        assert_eq!(s.upload_limit, DEFAULT_UPLOAD_LIMIT);
        assert_eq!(s.name, "Admin");
    }

    #[test]
    fn root_prefix_is_empty() {
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("/admin"), "/admin");
    }
}
