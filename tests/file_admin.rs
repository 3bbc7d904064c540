//! File admin over a temporary directory.

use adminkit::{Admin, AdminSettings, FileAdmin, FileAdminConfig};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn app(root: &Path, options: Value) -> Router {
    let mut config = json!({
        "name": "Files",
        "base_path": root.to_string_lossy(),
        "allowed_extensions": ["txt", "md"],
        "editable_extensions": ["txt"],
    });
    if let (Some(base), Some(extra)) = (config.as_object_mut(), options.as_object()) {
        base.extend(extra.clone());
    }
    let config: FileAdminConfig = serde_json::from_value(config).unwrap();
    let settings = Arc::new(AdminSettings::default());
    let mut admin = Admin::new(settings.clone());
    admin.add_view(Arc::new(FileAdmin::local(settings, config))).unwrap();
    admin.router()
}

fn setup() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("docs")).unwrap();
    std::fs::write(dir.path().join("docs/notes.txt"), "draft").unwrap();
    std::fs::write(dir.path().join("a.md"), "# a").unwrap();
    let app = app(dir.path(), json!({}));
    (dir, app)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value, Vec<u8>) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap().to_vec();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body, bytes)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value, Vec<u8>) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &Router, uri: &str, form: &str) -> (StatusCode, Value) {
    let req = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap();
    let (status, body, _) = send(app, req).await;
    (status, body)
}

async fn upload(app: &Router, uri: &str, filename: &str, content: &str) -> (StatusCode, Value) {
    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"{f}\"\r\nContent-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
        b = boundary,
        f = filename,
        c = content
    );
    let req = Request::post(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap();
    let (status, body, _) = send(app, req).await;
    (status, body)
}

fn message(body: &Value) -> &str {
    body["messages"][0]["message"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn browse_lists_directories_first() {
    let (_dir, app) = setup();
    let (status, body, _) = get(&app, "/admin/files/").await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items[0]["name"], "docs");
    assert_eq!(items[0]["url"], "/admin/files/b/docs");
    assert_eq!(items[1]["name"], "a.md");
    assert_eq!(items[1]["editable"], false);

    let (status, body, _) = get(&app, "/admin/files/b/docs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["breadcrumbs"][0]["name"], "docs");
    assert_eq!(body["data"]["parent_url"], "/admin/files/");
    assert_eq!(body["data"]["items"][0]["editable"], true);
}

#[tokio::test]
async fn paths_cannot_escape_the_root() {
    let (_dir, app) = setup();
    let (status, _, _) = get(&app, "/admin/files/b/docs/../../etc").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = get(&app, "/admin/files/download/..%2F..%2Fetc%2Fpasswd").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_checks_extension_and_existing_files() {
    let (dir, app) = setup();
    let (status, body) = upload(&app, "/admin/files/upload/docs", "new notes.txt", "hi").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(message(&body), "Successfully saved file: new_notes.txt");
    assert_eq!(std::fs::read_to_string(dir.path().join("docs/new_notes.txt")).unwrap(), "hi");

    let (status, body) = upload(&app, "/admin/files/upload/docs", "new_notes.txt", "again").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(message(&body), "File \"new_notes.txt\" already exists.");

    let (status, body) = upload(&app, "/admin/files/upload/", "run.sh", "echo").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(message(&body), "Invalid file type.");
    assert!(!dir.path().join("run.sh").exists());
}

#[tokio::test]
async fn download_returns_an_attachment() {
    let (_dir, app) = setup();
    let res = app
        .clone()
        .oneshot(Request::get("/admin/files/download/docs/notes.txt").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let disposition = res.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert_eq!(disposition, "attachment;filename=\"notes.txt\"");
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"draft");
}

#[tokio::test]
async fn mkdir_and_rename() {
    let (dir, app) = setup();
    let (status, body) = post(&app, "/admin/files/mkdir/?path=docs", "name=drafts").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(message(&body), "Successfully created directory: drafts");
    assert!(dir.path().join("docs/drafts").is_dir());

    let (status, body) = post(&app, "/admin/files/mkdir/", "name=..%2Fout").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(message(&body), "Invalid name.");

    let (status, body) = post(&app, "/admin/files/rename/", "path=docs%2Fnotes.txt&name=final.txt").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(message(&body), "Successfully renamed \"notes.txt\" to \"final.txt\"");
    assert!(dir.path().join("docs/final.txt").exists());

    let (_, body) = post(&app, "/admin/files/rename/", "path=docs%2Fmissing.txt&name=x.txt").await;
    assert_eq!(message(&body), "Path does not exist.");
}

#[tokio::test]
async fn edit_text_files_only() {
    let (dir, app) = setup();
    let (status, body, _) = get(&app, "/admin/files/edit/?path=docs%2Fnotes.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["content"], "draft");

    let (status, body) = post(&app, "/admin/files/edit/?path=docs%2Fnotes.txt", "content=final").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(message(&body), "Changes to notes.txt saved successfully.");
    assert_eq!(std::fs::read_to_string(dir.path().join("docs/notes.txt")).unwrap(), "final");

    let (_, body, _) = get(&app, "/admin/files/edit/?path=a.md").await;
    assert_eq!(message(&body), "Permission denied.");
}

#[tokio::test]
async fn delete_files_and_directories() {
    let (dir, app) = setup();
    let (_, body) = post(&app, "/admin/files/delete/", "path=a.md").await;
    assert_eq!(message(&body), "File \"a.md\" was successfully deleted.");
    assert!(!dir.path().join("a.md").exists());

    let (_, body) = post(&app, "/admin/files/delete/", "path=docs").await;
    assert_eq!(message(&body), "Directory \"docs\" was successfully deleted.");
    assert!(!dir.path().join("docs").exists());
}

#[tokio::test]
async fn batch_delete_and_disabled_operations() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("keep")).unwrap();
    std::fs::write(dir.path().join("x.txt"), "x").unwrap();
    std::fs::write(dir.path().join("y.txt"), "y").unwrap();
    let app = app(dir.path(), json!({ "can_delete_dirs": false, "can_mkdir": false }));

    let (status, body) = post(&app, "/admin/files/action/", "action=delete&path=x.txt&path=y.txt&path=keep").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let messages: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["message"].as_str().unwrap())
        .collect();
    assert_eq!(
        messages,
        vec![
            "File \"x.txt\" was successfully deleted.",
            "File \"y.txt\" was successfully deleted.",
            "Directory deletion is disabled.",
        ]
    );
    assert!(dir.path().join("keep").is_dir());

    let (_, body) = post(&app, "/admin/files/mkdir/", "name=new").await;
    assert_eq!(message(&body), "Directory creation is disabled.");
}
