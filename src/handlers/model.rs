//! Model view handlers. Each one extracts the request and delegates to the view.

use crate::error::AppError;
use crate::extractors::ReturnUrl;
use crate::form::FormData;
use crate::model::ModelView;
use axum::{
    extract::{Path, Query, State},
    response::Response,
    Form,
};
use std::sync::Arc;

type Args = Query<Vec<(String, String)>>;
type Body = Form<Vec<(String, String)>>;

pub async fn index(State(view): State<Arc<ModelView>>, Query(args): Args) -> Result<Response, AppError> {
    view.list(&args).await
}

pub async fn create_view(State(view): State<Arc<ModelView>>, ret: ReturnUrl) -> Result<Response, AppError> {
    view.create_view(&ret).await
}

pub async fn create(State(view): State<Arc<ModelView>>, ret: ReturnUrl, Form(body): Body) -> Result<Response, AppError> {
    view.create(&ret, FormData::new(body)).await
}

pub async fn edit_view(
    State(view): State<Arc<ModelView>>,
    ret: ReturnUrl,
    Query(args): Args,
) -> Result<Response, AppError> {
    view.edit_view(&args, &ret).await
}

pub async fn edit(
    State(view): State<Arc<ModelView>>,
    ret: ReturnUrl,
    Query(args): Args,
    Form(body): Body,
) -> Result<Response, AppError> {
    view.edit(&args, &ret, FormData::new(body)).await
}

pub async fn details(
    State(view): State<Arc<ModelView>>,
    ret: ReturnUrl,
    Query(args): Args,
) -> Result<Response, AppError> {
    view.details(&args, &ret).await
}

pub async fn delete(State(view): State<Arc<ModelView>>, ret: ReturnUrl, Form(body): Body) -> Result<Response, AppError> {
    view.delete(&ret, FormData::new(body)).await
}

pub async fn action(State(view): State<Arc<ModelView>>, ret: ReturnUrl, Form(body): Body) -> Result<Response, AppError> {
    view.action(&ret, FormData::new(body)).await
}

pub async fn ajax_lookup(State(view): State<Arc<ModelView>>, Query(args): Args) -> Result<Response, AppError> {
    view.ajax_lookup(&args).await
}

pub async fn ajax_update(State(view): State<Arc<ModelView>>, Form(body): Body) -> Result<Response, AppError> {
    view.ajax_update(FormData::new(body)).await
}

pub async fn export(
    State(view): State<Arc<ModelView>>,
    Path(export_type): Path<String>,
    ret: ReturnUrl,
    Query(args): Args,
) -> Result<Response, AppError> {
    view.export(&export_type, &args, &ret).await
}
