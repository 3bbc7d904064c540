//! File admin routes under the view's mount point.

use crate::admin::AdminView;
use crate::fileadmin::FileAdmin;
use crate::handlers::file::{
    action, delete, download, edit, edit_form, index, mkdir, rename, rename_form, upload, upload_form,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

pub fn file_routes(view: Arc<FileAdmin>) -> Router {
    let base = view.meta().url.clone();
    let at = |path: &str| format!("{}{}", base, path);
    let uploads = Router::new()
        .route(&at("/upload/"), get(upload_form).post(upload))
        .route(&at("/upload/*path"), get(upload_form).post(upload))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(view.upload_limit()));
    Router::new()
        .route(&at("/"), get(index))
        .route(&at("/b/*path"), get(index))
        .route(&at("/download/*path"), get(download))
        .route(&at("/mkdir/"), post(mkdir))
        .route(&at("/rename/"), get(rename_form).post(rename))
        .route(&at("/edit/"), get(edit_form).post(edit))
        .route(&at("/delete/"), post(delete))
        .route(&at("/action/"), post(action))
        .merge(uploads)
        .with_state(view)
}
