//! File admin handlers.

use crate::error::AppError;
use crate::fileadmin::FileAdmin;
use crate::form::FormData;
use axum::{
    extract::{Multipart, Path, Query, State},
    response::Response,
    Form,
};
use std::sync::Arc;

type Args = Query<Vec<(String, String)>>;
type Body = Form<Vec<(String, String)>>;

fn dir_of(path: Option<Path<String>>) -> String {
    path.map(|Path(p)| p).unwrap_or_default()
}

pub async fn index(
    State(view): State<Arc<FileAdmin>>,
    path: Option<Path<String>>,
    Query(args): Args,
) -> Result<Response, AppError> {
    view.index(&dir_of(path), &args).await
}

pub async fn upload_form(State(view): State<Arc<FileAdmin>>, path: Option<Path<String>>) -> Result<Response, AppError> {
    view.upload_form(&dir_of(path)).await
}

pub async fn upload(
    State(view): State<Arc<FileAdmin>>,
    path: Option<Path<String>>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut filename = None;
    let mut data = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("upload") {
            filename = field.file_name().map(str::to_string);
            data = field.bytes().await.map_err(|e| AppError::BadRequest(e.to_string()))?.to_vec();
            break;
        }
    }
    view.upload(&dir_of(path), filename, data).await
}

pub async fn download(State(view): State<Arc<FileAdmin>>, Path(path): Path<String>) -> Result<Response, AppError> {
    view.download(&path).await
}

pub async fn mkdir(State(view): State<Arc<FileAdmin>>, Query(args): Args, Form(body): Body) -> Result<Response, AppError> {
    let dir = args
        .iter()
        .find(|(k, _)| k == "path")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();
    view.mkdir(&dir, FormData::new(body)).await
}

pub async fn rename_form(State(view): State<Arc<FileAdmin>>, Query(args): Args) -> Result<Response, AppError> {
    view.rename_form(&args).await
}

pub async fn rename(State(view): State<Arc<FileAdmin>>, Form(body): Body) -> Result<Response, AppError> {
    view.rename(FormData::new(body)).await
}

pub async fn edit_form(State(view): State<Arc<FileAdmin>>, Query(args): Args) -> Result<Response, AppError> {
    view.edit_form(&args).await
}

pub async fn edit(State(view): State<Arc<FileAdmin>>, Query(args): Args, Form(body): Body) -> Result<Response, AppError> {
    view.edit(&args, FormData::new(body)).await
}

pub async fn delete(State(view): State<Arc<FileAdmin>>, Form(body): Body) -> Result<Response, AppError> {
    view.delete(FormData::new(body)).await
}

pub async fn action(State(view): State<Arc<FileAdmin>>, Form(body): Body) -> Result<Response, AppError> {
    view.action(FormData::new(body)).await
}
