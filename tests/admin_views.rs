//! Model views mounted through `Admin`, driven over HTTP against the memory backend.

use adminkit::backend::ModelBackend;
use adminkit::config::Record;
use adminkit::form::BoundForm;
use adminkit::{
    AccessPolicy, Admin, AdminConfig, AdminSettings, AppError, ConfigError, MemoryBackend, ModelView, ModelViewConfig,
    ModelViewHooks, ResolvedModel, ViewMeta,
};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, request::Parts, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const SCHEMAS: &str = r#"[{ "id": "blog", "name": "blog" }]"#;
const TABLES: &str = r#"[
    { "id": "users", "name": "users", "primary_key": "id", "display_column": "name" },
    { "id": "posts", "name": "posts", "primary_key": "id", "display_column": "title" }
]"#;
const COLUMNS: &str = r#"[
    { "id": "users.id", "table_id": "users", "name": "id", "type": "bigserial", "nullable": false },
    { "id": "users.name", "table_id": "users", "name": "name", "type": "varchar", "nullable": false },
    { "id": "users.email", "table_id": "users", "name": "email", "type": "varchar" },
    { "id": "users.active", "table_id": "users", "name": "active", "type": "boolean", "nullable": false, "default": true },
    { "id": "posts.id", "table_id": "posts", "name": "id", "type": "bigserial", "nullable": false },
    { "id": "posts.title", "table_id": "posts", "name": "title", "type": "varchar", "nullable": false },
    { "id": "posts.views", "table_id": "posts", "name": "views", "type": "integer" },
    { "id": "posts.user_id", "table_id": "posts", "name": "user_id", "type": "bigint" }
]"#;
const RELATIONSHIPS: &str = r#"[
    { "id": "posts_user", "from_table_id": "posts", "from_column_id": "posts.user_id",
      "to_table_id": "users", "to_column_id": "users.id" }
]"#;
const MODEL_VIEWS: &str = r#"[
    { "entity_id": "users", "category": "Blog", "can_view_details": true, "can_export": true,
      "column_searchable_list": ["name", "email"] },
    { "entity_id": "posts", "category": "Blog", "can_delete": false,
      "column_filters": ["views"], "form_ajax_refs": { "user_id": { "fields": ["name"] } } }
]"#;

struct Blog {
    app: Router,
    backend: Arc<MemoryBackend>,
    model: ResolvedModel,
}

async fn config() -> AdminConfig {
    let dir = tempfile::TempDir::new().unwrap();
    for (file, body) in [
        ("schemas.json", SCHEMAS),
        ("tables.json", TABLES),
        ("columns.json", COLUMNS),
        ("relationships.json", RELATIONSHIPS),
        ("model_views.json", MODEL_VIEWS),
    ] {
        std::fs::write(dir.path().join(file), body).unwrap();
    }
    AdminConfig::from_dir(dir.path()).await.unwrap()
}

async fn seeded(model: &ResolvedModel) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    let rows = |v: Value| -> Vec<Record> {
        v.as_array().unwrap().iter().map(|r| r.as_object().cloned().unwrap()).collect()
    };
    backend
        .seed(
            model.entity("users").unwrap(),
            rows(json!([
                { "name": "ann", "email": "ann@example.com", "active": true },
                { "name": "bob", "email": "bob@example.com", "active": false }
            ])),
        )
        .await
        .unwrap();
    backend
        .seed(
            model.entity("posts").unwrap(),
            rows(json!([
                { "title": "Hello", "views": 3, "user_id": 1 },
                { "title": "Popular", "views": 40, "user_id": 2 }
            ])),
        )
        .await
        .unwrap();
    backend
}

async fn blog_with(policy: Option<Arc<dyn AccessPolicy>>) -> Blog {
    let config = config().await;
    let model = adminkit::resolve(&config).unwrap();
    let backend = seeded(&model).await;

    let settings = Arc::new(AdminSettings::default());
    let mut admin = Admin::from_config(settings, &config, backend.clone()).unwrap();
    if let Some(policy) = policy {
        admin = admin.with_access_policy(policy);
    }
    Blog {
        app: admin.router(),
        backend,
        model,
    }
}

/// The blog tables behind the given views instead of the configured ones.
async fn blog_views(settings: AdminSettings, views: Value, hooks: Option<Arc<dyn ModelViewHooks>>) -> Blog {
    let model = adminkit::resolve(&config().await).unwrap();
    let backend = seeded(&model).await;
    let settings = Arc::new(settings);
    let shared = Arc::new(model.clone());
    let mut admin = Admin::new(settings.clone());
    let views: Vec<ModelViewConfig> = serde_json::from_value(views).unwrap();
    for cfg in views {
        let mut view = ModelView::build(settings.clone(), shared.clone(), backend.clone(), cfg).unwrap();
        if let Some(hooks) = &hooks {
            view = view.with_hooks(hooks.clone());
        }
        admin.add_view(Arc::new(view)).unwrap();
    }
    Blog {
        app: admin.router(),
        backend,
        model,
    }
}

async fn blog() -> Blog {
    blog_with(None).await
}

struct Response {
    status: StatusCode,
    location: Option<String>,
    content_type: Option<String>,
    disposition: Option<String>,
    text: String,
}

impl Response {
    fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap()
    }

    fn first_message(&self) -> String {
        self.json()["messages"][0]["message"].as_str().unwrap_or_default().to_string()
    }
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    let res = app.clone().oneshot(req).await.unwrap();
    let header_of = |name: header::HeaderName| {
        res.headers()
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    };
    let status = res.status();
    let location = header_of(header::LOCATION);
    let content_type = header_of(header::CONTENT_TYPE);
    let disposition = header_of(header::CONTENT_DISPOSITION);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    Response {
        status,
        location,
        content_type,
        disposition,
        text: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

async fn get(app: &Router, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &Router, uri: &str, form: &str) -> Response {
    let req = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap();
    send(app, req).await
}

async fn row(blog: &Blog, table: &str, id: i64) -> Option<Record> {
    blog.backend
        .get_one(blog.model.entity(table).unwrap(), &json!(id))
        .await
        .unwrap()
}

async fn user(blog: &Blog, id: i64) -> Option<Record> {
    row(blog, "users", id).await
}

#[tokio::test]
async fn index_lists_menu_by_category() {
    let blog = blog().await;
    let res = get(&blog.app, "/admin/").await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["data"]["name"], "Admin");
    let menu = body["data"]["menu"].as_array().unwrap();
    assert_eq!(menu.len(), 1);
    assert_eq!(menu[0]["type"], "category");
    assert_eq!(menu[0]["children"][0]["url"], "/admin/users/");
    assert_eq!(menu[0]["children"][1]["name"], "Posts");
}

#[tokio::test]
async fn list_formats_rows_and_searches() {
    let blog = blog().await;
    let res = get(&blog.app, "/admin/users/").await;
    assert_eq!(res.status, StatusCode::OK);
    let data = res.json()["data"].clone();
    assert_eq!(data["count"], 2);
    assert_eq!(data["num_pages"], 1);
    assert_eq!(data["rows"][0]["values"]["name"], "ann");
    assert_eq!(data["rows"][1]["values"]["active"], "False");
    assert_eq!(data["actions"][0]["name"], "delete");

    let found = get(&blog.app, "/admin/users/?search=BOB").await.json();
    assert_eq!(found["data"]["count"], 1);
    assert_eq!(found["data"]["rows"][0]["pk"], 2);
}

#[tokio::test]
async fn list_page_past_the_end_is_empty() {
    let blog = blog().await;
    let res = get(&blog.app, "/admin/users/?page=18446744073709551615").await;
    assert_eq!(res.status, StatusCode::OK);
    let data = res.json()["data"].clone();
    assert_eq!(data["count"], 2);
    assert_eq!(data["rows"], json!([]));
}

#[tokio::test]
async fn list_applies_filters_and_relation_labels() {
    let blog = blog().await;
    let data = get(&blog.app, "/admin/posts/?flt0_2=10").await.json()["data"].clone();
    assert_eq!(data["count"], 1);
    assert_eq!(data["rows"][0]["values"]["title"], "Popular");
    assert_eq!(data["rows"][0]["values"]["user_id"], "bob");
    assert_eq!(data["active_filters"][0]["arg"], "flt0_2");
    assert_eq!(data["active_filters"][0]["value"], "10");
}

#[tokio::test]
async fn create_redirects_with_flash() {
    let blog = blog().await;
    let res = post(&blog.app, "/admin/users/new/", "name=cara&email=cara%40example.com&active=y").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location.as_deref(), Some("/admin/users/"));
    assert_eq!(res.first_message(), "Record was successfully created.");
    assert_eq!(user(&blog, 3).await.unwrap()["name"], "cara");

    let again = post(&blog.app, "/admin/users/new/", "name=dan&_continue_editing=1").await;
    assert_eq!(again.status, StatusCode::SEE_OTHER);
    assert!(again.location.unwrap().starts_with("/admin/users/edit/?id=4"));
}

#[tokio::test]
async fn invalid_create_redisplays_the_form() {
    let blog = blog().await;
    let res = post(&blog.app, "/admin/users/new/", "name=+&email=x").await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = res.json();
    let fields = body["data"]["form"]["fields"].as_array().unwrap();
    let name = fields.iter().find(|f| f["name"] == "name").unwrap();
    assert_eq!(name["errors"][0], "This field is required.");
    assert!(user(&blog, 3).await.is_none());
}

#[tokio::test]
async fn edit_saves_and_reports_missing_records() {
    let blog = blog().await;
    let page = get(&blog.app, "/admin/users/edit/?id=1").await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.json()["data"]["pk"], 1);

    let res = post(&blog.app, "/admin/users/edit/?id=1&url=%2Fadmin%2Fusers%2F%3Fpage%3D0", "name=Annie&active=y").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location.as_deref(), Some("/admin/users/?page=0"));
    assert_eq!(res.first_message(), "Record was successfully saved.");
    let saved = user(&blog, 1).await.unwrap();
    assert_eq!(saved["name"], "Annie");
    assert_eq!(saved["email"], "ann@example.com");

    let missing = get(&blog.app, "/admin/users/edit/?id=99").await;
    assert_eq!(missing.status, StatusCode::SEE_OTHER);
    assert_eq!(missing.first_message(), "Record does not exist.");
}

#[tokio::test]
async fn unsafe_return_urls_fall_back_to_the_list() {
    let blog = blog().await;
    let res = post(&blog.app, "/admin/users/new/?url=http%3A%2F%2Fevil.example%2F", "name=eve").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location.as_deref(), Some("/admin/users/"));
}

#[tokio::test]
async fn details_show_formatted_values() {
    let blog = blog().await;
    let data = get(&blog.app, "/admin/users/details/?id=2").await.json()["data"].clone();
    let columns = data["columns"].as_array().unwrap();
    let active = columns.iter().find(|c| c["name"] == "active").unwrap();
    assert_eq!(active["value"], "False");
}

#[tokio::test]
async fn delete_and_batch_action() {
    let blog = blog().await;
    let res = post(&blog.app, "/admin/users/delete/", "id=2").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.first_message(), "Record was successfully deleted.");
    assert!(user(&blog, 2).await.is_none());

    post(&blog.app, "/admin/users/new/", "name=cara").await;
    let res = post(&blog.app, "/admin/users/action/", "action=delete&rowid=1&rowid=3").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.first_message(), "2 records were successfully deleted.");
    assert_eq!(blog.backend.count(blog.model.entity("users").unwrap()).await, 0);
}

#[tokio::test]
async fn disabled_permissions_redirect() {
    let blog = blog().await;
    let res = post(&blog.app, "/admin/posts/delete/", "id=1").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location.as_deref(), Some("/admin/posts/"));
    assert_eq!(res.first_message(), "Permission denied.");

    let export = get(&blog.app, "/admin/posts/export/csv/").await;
    assert_eq!(export.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn export_writes_csv_attachment() {
    let blog = blog().await;
    let res = get(&blog.app, "/admin/users/export/csv/").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.content_type.unwrap().starts_with("text/csv"));
    assert!(res.disposition.unwrap().starts_with("attachment;filename=\"Users_"));
    let mut lines = res.text.split("\r\n");
    assert_eq!(lines.next(), Some("Name,Email,Active"));
    assert_eq!(lines.next(), Some("ann,ann@example.com,True"));
}

#[tokio::test]
async fn ajax_lookup_returns_pk_label_pairs() {
    let blog = blog().await;
    let res = get(&blog.app, "/admin/posts/ajax/lookup/?name=user_id&query=bo").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json(), json!([[2, "bob"]]));

    let unknown = get(&blog.app, "/admin/posts/ajax/lookup/?name=title&query=x").await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

struct HideUsers;

#[async_trait]
impl AccessPolicy for HideUsers {
    async fn is_accessible(&self, view: &ViewMeta, _parts: &Parts) -> bool {
        view.endpoint != "users"
    }
}

#[tokio::test]
async fn access_policy_guards_views_and_menu() {
    let blog = blog_with(Some(Arc::new(HideUsers))).await;
    assert_eq!(get(&blog.app, "/admin/users/").await.status, StatusCode::FORBIDDEN);
    assert_eq!(post(&blog.app, "/admin/users/delete/", "id=1").await.status, StatusCode::FORBIDDEN);
    assert!(user(&blog, 1).await.is_some());
    assert_eq!(get(&blog.app, "/admin/posts/").await.status, StatusCode::OK);

    let menu = get(&blog.app, "/admin/").await.json()["data"]["menu"].clone();
    let children = menu[0]["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["endpoint"], "posts");
}

#[tokio::test]
async fn duplicate_endpoints_are_rejected() {
    let mut config = config().await;
    let again = config.model_views[0].clone();
    config.model_views.push(again);
    let built = Admin::from_config(Arc::new(AdminSettings::default()), &config, Arc::new(MemoryBackend::new()));
    assert!(matches!(built, Err(ConfigError::DuplicateEndpoint(e)) if e == "users"));
}

#[tokio::test]
async fn inline_posts_round_trip_through_create_and_edit() {
    let views = json!([{ "entity_id": "users", "inline_models": [{ "entity_id": "posts" }] }]);
    let blog = blog_views(AdminSettings::default(), views, None).await;

    let res = post(
        &blog.app,
        "/admin/users/new/",
        "name=cara&active=y&posts-0-title=first&posts-0-views=1&posts-1-title=second",
    )
    .await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(row(&blog, "posts", 3).await.unwrap()["user_id"], 3);
    assert_eq!(row(&blog, "posts", 4).await.unwrap()["title"], "second");

    let page = get(&blog.app, "/admin/users/edit/?id=3").await.json();
    let inline = page["data"]["form"]["inlines"][0].clone();
    assert_eq!(inline["name"], "posts");
    assert_eq!(inline["entries"].as_array().unwrap().len(), 2);
    assert_eq!(inline["entries"][0]["pk"], 3);

    let res = post(
        &blog.app,
        "/admin/users/edit/?id=3",
        "name=cara&active=y&posts-0-id=3&posts-0-title=FIRST&posts-1-id=4&posts-1-title=second&del-posts-1=y&posts-2-title=third",
    )
    .await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(row(&blog, "posts", 3).await.unwrap()["title"], "FIRST");
    assert!(row(&blog, "posts", 4).await.is_none());
    let third = row(&blog, "posts", 5).await.unwrap();
    assert_eq!(third["title"], "third");
    assert_eq!(third["user_id"], 3);
    assert_eq!(row(&blog, "posts", 1).await.unwrap()["user_id"], 1);
}

#[tokio::test]
async fn inline_errors_keep_the_parent_unsaved() {
    let views = json!([{ "entity_id": "users", "inline_models": [{ "entity_id": "posts" }] }]);
    let blog = blog_views(AdminSettings::default(), views, None).await;
    let res = post(&blog.app, "/admin/users/new/", "name=cara&posts-0-title=x&posts-0-views=many").await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(user(&blog, 3).await.is_none());
    assert!(row(&blog, "posts", 3).await.is_none());
}

#[tokio::test]
async fn ajax_update_saves_one_column() {
    let views = json!([{ "entity_id": "users", "column_editable_list": ["name"] }]);
    let blog = blog_views(AdminSettings::default(), views, None).await;

    let res = post(&blog.app, "/admin/users/ajax/update/", "list_form_pk=1&name=Annie").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text, "Record was successfully saved.");
    let saved = user(&blog, 1).await.unwrap();
    assert_eq!(saved["name"], "Annie");
    assert_eq!(saved["email"], "ann@example.com");

    let res = post(&blog.app, "/admin/users/ajax/update/", "list_form_pk=1&name=").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text, "Failed to update record. This field is required.");
    assert_eq!(user(&blog, 1).await.unwrap()["name"], "Annie");

    let res = post(&blog.app, "/admin/users/ajax/update/", "list_form_pk=99&name=x").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text, "Record does not exist.");
}

/// Upper-cases names, refuses reserved ones and records what happened.
#[derive(Default)]
struct Audit {
    log: Mutex<Vec<String>>,
}

fn name_of(record: &Record) -> String {
    record.get("name").and_then(Value::as_str).unwrap_or_default().to_string()
}

#[async_trait]
impl ModelViewHooks for Audit {
    async fn on_model_change(&self, _form: &BoundForm, record: &mut Record, _is_created: bool) -> Result<(), AppError> {
        let name = name_of(record);
        match name.as_str() {
            "root" => Err(AppError::Conflict("name \"root\" is reserved".into())),
            "offline" => Err(AppError::Db(sqlx::Error::PoolTimedOut)),
            _ => {
                record.insert("name".into(), Value::String(name.to_uppercase()));
                Ok(())
            }
        }
    }

    async fn after_model_change(&self, _form: &BoundForm, record: &Record, is_created: bool) -> Result<(), AppError> {
        let verb = if is_created { "created" } else { "saved" };
        self.log.lock().unwrap().push(format!("{} {}", verb, name_of(record)));
        Ok(())
    }

    async fn on_model_delete(&self, record: &Record) -> Result<(), AppError> {
        if name_of(record) == "ann" {
            return Err(AppError::Conflict("ann is protected".into()));
        }
        Ok(())
    }

    async fn after_model_delete(&self, record: &Record) -> Result<(), AppError> {
        self.log.lock().unwrap().push(format!("deleted {}", name_of(record)));
        Ok(())
    }
}

async fn audited(debug: bool) -> (Blog, Arc<Audit>) {
    let audit = Arc::new(Audit::default());
    let settings = AdminSettings {
        debug,
        ..AdminSettings::default()
    };
    let blog = blog_views(settings, json!([{ "entity_id": "users" }]), Some(audit.clone())).await;
    (blog, audit)
}

#[tokio::test]
async fn hooks_change_records_and_observe_saves() {
    let (blog, audit) = audited(false).await;
    let res = post(&blog.app, "/admin/users/new/", "name=cara").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(user(&blog, 3).await.unwrap()["name"], "CARA");

    post(&blog.app, "/admin/users/edit/?id=2", "name=robert").await;
    assert_eq!(user(&blog, 2).await.unwrap()["name"], "ROBERT");

    let res = post(&blog.app, "/admin/users/delete/", "id=2").await;
    assert_eq!(res.first_message(), "Record was successfully deleted.");
    assert_eq!(
        *audit.log.lock().unwrap(),
        vec!["created CARA", "saved ROBERT", "deleted ROBERT"]
    );
}

#[tokio::test]
async fn hook_failures_are_flashed() {
    let (blog, audit) = audited(false).await;
    let res = post(&blog.app, "/admin/users/new/", "name=root").await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.first_message(), "Failed to create record. name \"root\" is reserved");
    assert!(user(&blog, 3).await.is_none());

    let res = post(&blog.app, "/admin/users/edit/?id=2", "name=offline").await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.first_message().starts_with("Failed to update record. database:"));
    assert_eq!(user(&blog, 2).await.unwrap()["name"], "bob");

    let res = post(&blog.app, "/admin/users/delete/", "id=1").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.first_message(), "Failed to delete record. ann is protected");
    assert!(user(&blog, 1).await.is_some());
    assert!(audit.log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn debug_mode_reraises_backend_errors() {
    let (blog, _) = audited(true).await;
    let res = post(&blog.app, "/admin/users/new/", "name=offline").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json()["error"]["code"], "database_error");
    assert!(user(&blog, 3).await.is_none());

    // validation failures still come back as a form
    let res = post(&blog.app, "/admin/users/new/", "name=+").await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
}
