//! Admin registry: views, menu, index page and per-view access control.

pub mod view;

pub use view::{AccessPolicy, AdminView, AllowAll, ViewMeta};

use crate::backend::ModelBackend;
use crate::config::{resolve, AdminConfig};
use crate::error::ConfigError;
use crate::fileadmin::FileAdmin;
use crate::model::ModelView;
use crate::response::success_one_ok;
use crate::settings::AdminSettings;
use axum::{
    extract::{Request, State},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use view::{check_access, AccessGuard};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub name: String,
    pub endpoint: String,
    pub url: String,
}

/// Top-level menu entry. Categories sit where their first view was registered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MenuEntry {
    View(MenuItem),
    Category { name: String, children: Vec<MenuItem> },
}

fn build_menu<'a>(metas: impl IntoIterator<Item = &'a ViewMeta>) -> Vec<MenuEntry> {
    let mut menu: Vec<MenuEntry> = Vec::new();
    for meta in metas {
        let item = MenuItem {
            name: meta.name.clone(),
            endpoint: meta.endpoint.clone(),
            url: meta.index_url(),
        };
        let Some(category) = &meta.category else {
            menu.push(MenuEntry::View(item));
            continue;
        };
        let existing = menu.iter_mut().find_map(|entry| match entry {
            MenuEntry::Category { name, children } if *name == *category => Some(children),
            _ => None,
        });
        match existing {
            Some(children) => children.push(item),
            None => menu.push(MenuEntry::Category {
                name: category.clone(),
                children: vec![item],
            }),
        }
    }
    menu
}

pub struct Admin {
    settings: Arc<AdminSettings>,
    views: Vec<Arc<dyn AdminView>>,
    policy: Arc<dyn AccessPolicy>,
}

struct IndexState {
    name: String,
    metas: Vec<ViewMeta>,
    policy: Arc<dyn AccessPolicy>,
}

async fn index(State(state): State<Arc<IndexState>>, req: Request) -> Response {
    let (parts, _) = req.into_parts();
    let mut visible = Vec::new();
    for meta in &state.metas {
        if state.policy.is_accessible(meta, &parts).await {
            visible.push(meta);
        }
    }
    success_one_ok(serde_json::json!({
        "name": state.name,
        "menu": build_menu(visible),
    }))
    .into_response()
}

impl Admin {
    pub fn new(settings: Arc<AdminSettings>) -> Self {
        Admin {
            settings,
            views: Vec::new(),
            policy: Arc::new(AllowAll),
        }
    }

    pub fn with_access_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Register a view. Endpoints and mount points must be unique.
    pub fn add_view(&mut self, view: Arc<dyn AdminView>) -> Result<(), ConfigError> {
        let meta = view.meta();
        if let Some(other) = self
            .views
            .iter()
            .find(|v| v.meta().endpoint == meta.endpoint || v.meta().url == meta.url)
        {
            let clash = if other.meta().endpoint == meta.endpoint {
                &meta.endpoint
            } else {
                &meta.url
            };
            return Err(ConfigError::DuplicateEndpoint(clash.clone()));
        }
        tracing::debug!(endpoint = %meta.endpoint, url = %meta.url, "view registered");
        self.views.push(view);
        Ok(())
    }

    /// Resolve the config, then build one model view per `model_views` entry and one file admin
    /// per `file_admins` entry, in document order.
    pub fn from_config(
        settings: Arc<AdminSettings>,
        config: &AdminConfig,
        backend: Arc<dyn ModelBackend>,
    ) -> Result<Admin, ConfigError> {
        let model = Arc::new(resolve(config)?);
        let mut admin = Admin::new(settings.clone());
        for view_config in &config.model_views {
            let view = ModelView::build(settings.clone(), model.clone(), backend.clone(), view_config.clone())?;
            admin.add_view(Arc::new(view))?;
        }
        for file_config in &config.file_admins {
            admin.add_view(Arc::new(FileAdmin::local(settings.clone(), file_config.clone())))?;
        }
        tracing::info!(views = admin.views.len(), "admin built");
        Ok(admin)
    }

    pub fn settings(&self) -> &AdminSettings {
        &self.settings
    }

    pub fn views(&self) -> &[Arc<dyn AdminView>] {
        &self.views
    }

    pub fn menu(&self) -> Vec<MenuEntry> {
        build_menu(self.views.iter().map(|v| v.meta()))
    }

    /// Every view's routes behind the access check, plus the index at the url prefix.
    pub fn router(&self) -> Router {
        let mut router = Router::new();
        for view in &self.views {
            let guard = AccessGuard {
                meta: view.meta().clone(),
                policy: self.policy.clone(),
            };
            let routes = view
                .clone()
                .router()
                .route_layer(middleware::from_fn_with_state(guard, check_access));
            router = router.merge(routes);
        }
        let state = Arc::new(IndexState {
            name: self.settings.name.clone(),
            metas: self.views.iter().map(|v| v.meta().clone()).collect(),
            policy: self.policy.clone(),
        });
        let prefix = &self.settings.url_prefix;
        let mut index_routes = Router::new().route(&format!("{}/", prefix), get(index));
        if !prefix.is_empty() {
            index_routes = index_routes.route(prefix, get(index));
        }
        router.merge(index_routes.with_state(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(ViewMeta);

    impl AdminView for Stub {
        fn meta(&self) -> &ViewMeta {
            &self.0
        }

        fn router(self: Arc<Self>) -> Router {
            Router::new().route(&self.0.index_url(), get(|| async { "ok" }))
        }
    }

    fn stub(settings: &AdminSettings, name: &str, category: Option<&str>) -> Arc<dyn AdminView> {
        Arc::new(Stub(ViewMeta::new(settings, name, None, None, category)))
    }

    #[test]
    fn rejects_duplicate_endpoints() {
        let settings = Arc::new(AdminSettings::default());
        let mut admin = Admin::new(settings.clone());
        admin.add_view(stub(&settings, "Users", None)).unwrap();
        let err = admin.add_view(stub(&settings, "Users", Some("Other"))).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateEndpoint(e) if e == "users"));
        assert_eq!(admin.views().len(), 1);
    }

    #[test]
    fn menu_groups_categories_in_registration_order() {
        let settings = Arc::new(AdminSettings::default());
        let mut admin = Admin::new(settings.clone());
        admin.add_view(stub(&settings, "Posts", Some("Blog"))).unwrap();
        admin.add_view(stub(&settings, "Files", None)).unwrap();
        admin.add_view(stub(&settings, "Comments", Some("Blog"))).unwrap();

        let menu = admin.menu();
        assert_eq!(menu.len(), 2);
        match &menu[0] {
            MenuEntry::Category { name, children } => {
                assert_eq!(name, "Blog");
                let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["Posts", "Comments"]);
                assert_eq!(children[1].url, "/admin/comments/");
            }
            other => panic!("unexpected entry: {:?}", other),
        }
        assert!(matches!(&menu[1], MenuEntry::View(item) if item.endpoint == "files"));
    }
}
