//! Model view routes under the view's mount point.

use crate::admin::AdminView;
use crate::handlers::model::{
    action, ajax_lookup, ajax_update, create, create_view, delete, details, edit, edit_view, export, index,
};
use crate::model::ModelView;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn model_routes(view: Arc<ModelView>) -> Router {
    let base = view.meta().url.clone();
    let at = |path: &str| format!("{}{}", base, path);
    Router::new()
        .route(&at("/"), get(index))
        .route(&at("/new/"), get(create_view).post(create))
        .route(&at("/edit/"), get(edit_view).post(edit))
        .route(&at("/details/"), get(details))
        .route(&at("/delete/"), post(delete))
        .route(&at("/action/"), post(action))
        .route(&at("/ajax/lookup/"), get(ajax_lookup))
        .route(&at("/ajax/update/"), post(ajax_update))
        .route(&at("/export/:export_type/"), get(export))
        .with_state(view)
}
