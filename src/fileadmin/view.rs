//! File manager view over a `FileStorage`.

use super::storage::{join_path, normalize_path, parent_of, FileEntry, FileStorage, LocalFileStorage};
use crate::admin::{AdminView, ViewMeta};
use crate::config::FileAdminConfig;
use crate::error::{AppError, StorageError};
use crate::form::FormData;
use crate::model::export::attachment;
use crate::naming::secure_filename;
use crate::response::{success_one_ok, unprocessable, FlashMessage, Redirect};
use crate::settings::AdminSettings;
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::Serialize;
use serde_json::json;
use std::cmp::Ordering;
use std::sync::Arc;

fn arg<'a>(args: &'a [(String, String)], key: &str) -> Option<&'a str> {
    args.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn extension(name: &str) -> Option<String> {
    name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

/// A bare name for mkdir and rename: no separators, not `.`/`..`, no leading dot.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\']) && !name.chars().any(char::is_control)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SortKey {
    Name,
    Size,
    Date,
}

/// Directories first, then by the chosen key.
fn sort_entries(items: &mut [FileEntry], key: SortKey, desc: bool) {
    items.sort_by(|a, b| {
        let ord = match key {
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::Size => a.size.cmp(&b.size).then_with(|| a.name.cmp(&b.name)),
            SortKey::Date => a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)),
        };
        let ord = if desc { ord.reverse() } else { ord };
        match (a.is_dir, b.is_dir) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => ord,
        }
    });
}

#[derive(Serialize)]
struct Crumb {
    name: String,
    url: String,
}

#[derive(Serialize)]
struct Item {
    #[serde(flatten)]
    entry: FileEntry,
    url: Option<String>,
    editable: bool,
}

pub struct FileAdmin {
    meta: ViewMeta,
    settings: Arc<AdminSettings>,
    config: FileAdminConfig,
    storage: Arc<dyn FileStorage>,
}

impl FileAdmin {
    pub fn new(settings: Arc<AdminSettings>, config: FileAdminConfig, storage: Arc<dyn FileStorage>) -> Self {
        let meta = ViewMeta::new(
            &settings,
            &config.name,
            config.endpoint.as_deref(),
            config.url.as_deref(),
            config.category.as_deref(),
        );
        FileAdmin {
            meta,
            settings,
            config,
            storage,
        }
    }

    /// View over the local directory named by `base_path`.
    pub fn local(settings: Arc<AdminSettings>, config: FileAdminConfig) -> Self {
        let storage = Arc::new(LocalFileStorage::new(&config.base_path));
        FileAdmin::new(settings, config, storage)
    }

    pub fn config(&self) -> &FileAdminConfig {
        &self.config
    }

    pub fn upload_limit(&self) -> usize {
        self.settings.upload_limit
    }

    pub fn is_file_allowed(&self, name: &str) -> bool {
        self.config.allowed_extensions.is_empty()
            || extension(name).is_some_and(|ext| self.config.allowed_extensions.contains(&ext))
    }

    pub fn is_file_editable(&self, name: &str) -> bool {
        extension(name).is_some_and(|ext| self.config.editable_extensions.contains(&ext))
    }

    fn dir_url(&self, dir: &str) -> String {
        if dir.is_empty() {
            self.meta.index_url()
        } else {
            format!("{}/b/{}", self.meta.url, dir)
        }
    }

    fn page_url(&self, page: &str, path: &str) -> String {
        crate::model::url_with(&format!("{}/{}/", self.meta.url, page), &[("path", path)])
    }

    fn flash_to(&self, location: String, message: FlashMessage) -> Response {
        Redirect::to(location).with(message).into_response()
    }

    /// Normalize a requested path; escaping the root reads as a missing path.
    fn clean(&self, path: &str) -> Result<String, AppError> {
        normalize_path(path).map_err(|_| AppError::Storage(StorageError::NotFound(path.to_string())))
    }

    pub async fn index(&self, path: &str, args: &[(String, String)]) -> Result<Response, AppError> {
        let dir = self.clean(path)?;
        let meta = self.storage.metadata(&dir).await?;
        if !meta.is_dir {
            return Err(AppError::Storage(StorageError::NotFound(dir)));
        }
        let key = match arg(args, "sort") {
            Some("size") => SortKey::Size,
            Some("date") => SortKey::Date,
            _ => SortKey::Name,
        };
        let desc = arg(args, "desc").is_some_and(|v| v == "1");
        let mut entries = self.storage.list(&dir).await?;
        sort_entries(&mut entries, key, desc);

        let items: Vec<Item> = entries
            .into_iter()
            .map(|entry| {
                let url = if entry.is_dir {
                    Some(self.dir_url(&entry.path))
                } else if self.config.can_download {
                    Some(format!("{}/download/{}", self.meta.url, entry.path))
                } else {
                    None
                };
                let editable = !entry.is_dir && self.is_file_editable(&entry.name);
                Item { entry, url, editable }
            })
            .collect();

        let mut breadcrumbs = Vec::new();
        let mut acc = String::new();
        for part in dir.split('/').filter(|p| !p.is_empty()) {
            acc = join_path(&acc, part);
            breadcrumbs.push(Crumb {
                name: part.to_string(),
                url: self.dir_url(&acc),
            });
        }
        let parent = (!dir.is_empty()).then(|| self.dir_url(parent_of(&dir)));
        let upload = if dir.is_empty() {
            format!("{}/upload/", self.meta.url)
        } else {
            format!("{}/upload/{}", self.meta.url, dir)
        };

        let sort = match key {
            SortKey::Name => "name",
            SortKey::Size => "size",
            SortKey::Date => "date",
        };
        let actions = if self.config.can_delete {
            json!([{ "name": "delete", "text": "Delete", "confirmation": "Are you sure you want to delete these files?" }])
        } else {
            json!([])
        };
        let body = json!({
            "name": self.meta.name,
            "dir_path": dir,
            "parent_url": parent,
            "breadcrumbs": breadcrumbs,
            "items": items,
            "sort": sort,
            "desc": desc,
            "actions": actions,
            "permissions": {
                "can_upload": self.config.can_upload,
                "can_download": self.config.can_download,
                "can_delete": self.config.can_delete,
                "can_delete_dirs": self.config.can_delete_dirs,
                "can_mkdir": self.config.can_mkdir,
                "can_rename": self.config.can_rename,
            },
            "urls": {
                "upload": upload,
                "mkdir": self.page_url("mkdir", &dir),
                "rename": format!("{}/rename/", self.meta.url),
                "delete": format!("{}/delete/", self.meta.url),
                "action": format!("{}/action/", self.meta.url),
            },
        });
        Ok(success_one_ok(body).into_response())
    }

    pub async fn upload_form(&self, path: &str) -> Result<Response, AppError> {
        let dir = self.clean(path)?;
        if !self.config.can_upload {
            return Ok(self.flash_to(self.dir_url(&dir), FlashMessage::error("File uploading is disabled.")));
        }
        Ok(success_one_ok(json!({
            "dir_path": dir,
            "fields": [{ "name": "upload", "type": "file", "required": true }],
            "allowed_extensions": self.config.allowed_extensions,
        }))
        .into_response())
    }

    /// Store an uploaded file in `path`. Existing files are never replaced.
    pub async fn upload(&self, path: &str, filename: Option<String>, data: Vec<u8>) -> Result<Response, AppError> {
        let dir = self.clean(path)?;
        let back = self.dir_url(&dir);
        if !self.config.can_upload {
            return Ok(self.flash_to(back, FlashMessage::error("File uploading is disabled.")));
        }
        let form = |messages: Vec<FlashMessage>| {
            unprocessable(json!({ "dir_path": dir, "fields": [{ "name": "upload", "type": "file" }] }), messages)
                .into_response()
        };
        let Some(original) = filename.filter(|f| !f.is_empty()) else {
            return Ok(form(vec![FlashMessage::error("This field is required.")]));
        };
        if !self.is_file_allowed(&original) {
            return Ok(form(vec![FlashMessage::error("Invalid file type.")]));
        }
        let name = secure_filename(&original);
        if name.is_empty() {
            return Ok(form(vec![FlashMessage::error("Invalid file type.")]));
        }
        let target = join_path(&dir, &name);
        match self.storage.metadata(&target).await {
            Ok(_) => {
                return Ok(form(vec![FlashMessage::error(format!("File \"{}\" already exists.", name))]));
            }
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.storage.write(&target, &data).await?;
        tracing::info!(view = %self.meta.endpoint, path = %target, bytes = data.len(), "file uploaded");
        Ok(self.flash_to(back, FlashMessage::success(format!("Successfully saved file: {}", name))))
    }

    pub async fn download(&self, path: &str) -> Result<Response, AppError> {
        let file = self.clean(path)?;
        if !self.config.can_download {
            return Ok(self.flash_to(
                self.meta.index_url(),
                FlashMessage::error("File downloading is disabled."),
            ));
        }
        let meta = self.storage.metadata(&file).await?;
        if meta.is_dir {
            return Err(AppError::Storage(StorageError::NotFound(file)));
        }
        let data = self.storage.read(&file).await?;
        let name = secure_filename(&meta.name);
        Ok(attachment(&name, "application/octet-stream", data))
    }

    pub async fn mkdir(&self, path: &str, data: FormData) -> Result<Response, AppError> {
        let dir = self.clean(path)?;
        let back = self.dir_url(&dir);
        if !self.config.can_mkdir {
            return Ok(self.flash_to(back, FlashMessage::error("Directory creation is disabled.")));
        }
        let name = data.get("name").map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Ok(unprocessable(json!({ "dir_path": dir }), vec![FlashMessage::error("This field is required.")])
                .into_response());
        }
        if !is_valid_name(name) {
            return Ok(unprocessable(json!({ "dir_path": dir }), vec![FlashMessage::error("Invalid name.")])
                .into_response());
        }
        let message = match self.storage.create_dir(&join_path(&dir, name)).await {
            Ok(()) => {
                tracing::info!(view = %self.meta.endpoint, dir = %join_path(&dir, name), "directory created");
                FlashMessage::success(format!("Successfully created directory: {}", name))
            }
            Err(e) => FlashMessage::error(format!("Failed to create directory: {}", e)),
        };
        Ok(self.flash_to(back, message))
    }

    pub async fn rename_form(&self, args: &[(String, String)]) -> Result<Response, AppError> {
        let path = self.clean(arg(args, "path").unwrap_or_default())?;
        let back = self.dir_url(parent_of(&path));
        if !self.config.can_rename {
            return Ok(self.flash_to(back, FlashMessage::error("Renaming is disabled.")));
        }
        match self.storage.metadata(&path).await {
            Ok(entry) if !path.is_empty() => Ok(success_one_ok(json!({ "path": path, "name": entry.name })).into_response()),
            Ok(_) | Err(StorageError::NotFound(_)) => {
                Ok(self.flash_to(back, FlashMessage::error("Path does not exist.")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn rename(&self, data: FormData) -> Result<Response, AppError> {
        let path = self.clean(data.get("path").unwrap_or_default())?;
        let dir = parent_of(&path).to_string();
        let back = self.dir_url(&dir);
        if !self.config.can_rename {
            return Ok(self.flash_to(back, FlashMessage::error("Renaming is disabled.")));
        }
        let exists = match self.storage.metadata(&path).await {
            Ok(_) => !path.is_empty(),
            Err(StorageError::NotFound(_)) => false,
            Err(e) => return Err(e.into()),
        };
        if !exists {
            return Ok(self.flash_to(back, FlashMessage::error("Path does not exist.")));
        }
        let name = data.get("name").map(str::trim).unwrap_or_default();
        if !is_valid_name(name) {
            return Ok(unprocessable(json!({ "path": path }), vec![FlashMessage::error("Invalid name.")]).into_response());
        }
        let target = join_path(&dir, name);
        let old_name = path.rsplit('/').next().unwrap_or(&path).to_string();
        let message = match self.storage.rename(&path, &target).await {
            Ok(()) => {
                tracing::info!(view = %self.meta.endpoint, from = %path, to = %target, "renamed");
                FlashMessage::success(format!("Successfully renamed \"{}\" to \"{}\"", old_name, name))
            }
            Err(e) => FlashMessage::error(format!("Failed to rename: {}", e)),
        };
        Ok(self.flash_to(back, message))
    }

    pub async fn edit_form(&self, args: &[(String, String)]) -> Result<Response, AppError> {
        let path = self.clean(arg(args, "path").unwrap_or_default())?;
        let back = self.dir_url(parent_of(&path));
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        if !self.is_file_editable(&name) {
            return Ok(self.flash_to(back, FlashMessage::error("Permission denied.")));
        }
        let bytes = self.storage.read(&path).await?;
        match String::from_utf8(bytes) {
            Ok(content) => Ok(success_one_ok(json!({ "path": path, "name": name, "content": content })).into_response()),
            Err(_) => Ok(self.flash_to(back, FlashMessage::error(format!("Cannot edit {}.", name)))),
        }
    }

    pub async fn edit(&self, args: &[(String, String)], data: FormData) -> Result<Response, AppError> {
        let path = self.clean(arg(args, "path").or(data.get("path")).unwrap_or_default())?;
        let back = self.dir_url(parent_of(&path));
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        if !self.is_file_editable(&name) {
            return Ok(self.flash_to(back, FlashMessage::error("Permission denied.")));
        }
        let meta = self.storage.metadata(&path).await?;
        if meta.is_dir {
            return Err(AppError::Storage(StorageError::NotFound(path)));
        }
        let content = data.get("content").unwrap_or_default();
        let message = match self.storage.write(&path, content.as_bytes()).await {
            Ok(()) => {
                tracing::info!(view = %self.meta.endpoint, path = %path, "file edited");
                FlashMessage::success(format!("Changes to {} saved successfully.", name))
            }
            Err(e) => {
                tracing::warn!(view = %self.meta.endpoint, path = %path, error = %e, "file edit failed");
                FlashMessage::error(format!("Error saving changes to {}.", name))
            }
        };
        Ok(self.flash_to(back, message))
    }

    /// Delete one path; the flashed outcome.
    async fn delete_path(&self, path: &str) -> Result<FlashMessage, AppError> {
        let entry = match self.storage.metadata(path).await {
            Ok(entry) if !path.is_empty() => entry,
            Ok(_) | Err(StorageError::NotFound(_)) => return Ok(FlashMessage::error("Path does not exist.")),
            Err(e) => return Err(e.into()),
        };
        if entry.is_dir {
            if !self.config.can_delete_dirs {
                return Ok(FlashMessage::error("Directory deletion is disabled."));
            }
            return Ok(match self.storage.delete_dir(path).await {
                Ok(()) => {
                    tracing::info!(view = %self.meta.endpoint, path = %path, "directory deleted");
                    FlashMessage::success(format!("Directory \"{}\" was successfully deleted.", path))
                }
                Err(e) => FlashMessage::error(format!("Failed to delete directory: {}", e)),
            });
        }
        Ok(match self.storage.delete_file(path).await {
            Ok(()) => {
                tracing::info!(view = %self.meta.endpoint, path = %path, "file deleted");
                FlashMessage::success(format!("File \"{}\" was successfully deleted.", entry.name))
            }
            Err(_) => FlashMessage::error(format!("Failed to delete file: {}", entry.name)),
        })
    }

    pub async fn delete(&self, data: FormData) -> Result<Response, AppError> {
        let path = self.clean(data.get("path").unwrap_or_default())?;
        let back = self.dir_url(parent_of(&path));
        if !self.config.can_delete {
            return Ok(self.flash_to(back, FlashMessage::error("Deletion is disabled.")));
        }
        let message = self.delete_path(&path).await?;
        Ok(self.flash_to(back, message))
    }

    /// Batch action over the submitted `path` values; only `delete` exists.
    pub async fn action(&self, data: FormData) -> Result<Response, AppError> {
        let paths = data.get_all("path");
        let back = paths
            .first()
            .and_then(|p| normalize_path(p).ok())
            .map(|p| self.dir_url(parent_of(&p)))
            .unwrap_or_else(|| self.meta.index_url());
        if data.get("action") != Some("delete") || !self.config.can_delete {
            return Ok(Redirect::to(back).into_response());
        }
        let mut redirect = Redirect::to(back);
        for raw in paths {
            let message = match normalize_path(raw) {
                Ok(path) => self.delete_path(&path).await?,
                Err(_) => FlashMessage::error(format!("Failed to delete file: {}", raw)),
            };
            redirect = redirect.with(message);
        }
        Ok(redirect.into_response())
    }
}

impl AdminView for FileAdmin {
    fn meta(&self) -> &ViewMeta {
        &self.meta
    }

    fn router(self: Arc<Self>) -> Router {
        crate::routes::file_routes(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn config(allowed: &[&str], editable: &[&str]) -> FileAdminConfig {
        serde_json::from_value(json!({
            "name": "Files",
            "base_path": "/tmp",
            "allowed_extensions": allowed,
            "editable_extensions": editable,
        }))
        .unwrap()
    }

    fn entry(name: &str, is_dir: bool, size: u64, secs: i64) -> FileEntry {
        FileEntry {
            name: name.into(),
            path: name.into(),
            is_dir,
            size,
            modified: Utc.timestamp_opt(secs, 0).single(),
        }
    }

    #[test]
    fn extension_checks_are_case_insensitive() {
        let view = FileAdmin::local(Arc::new(AdminSettings::default()), config(&["txt", "md"], &["txt"]));
        assert!(view.is_file_allowed("notes.TXT"));
        assert!(!view.is_file_allowed("run.sh"));
        assert!(!view.is_file_allowed("README"));
        assert!(view.is_file_editable("a.txt"));
        assert!(!view.is_file_editable("a.md"));

        let open = FileAdmin::local(Arc::new(AdminSettings::default()), config(&[], &[]));
        assert!(open.is_file_allowed("anything"));
        assert_eq!(open.meta().url, "/admin/files");
    }

    #[test]
    fn directories_sort_first() {
        let mut items = vec![
            entry("b.txt", false, 10, 3),
            entry("zdir", true, 0, 1),
            entry("a.txt", false, 30, 2),
            entry("adir", true, 0, 2),
        ];
        sort_entries(&mut items, SortKey::Name, false);
        let names: Vec<&str> = items.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["adir", "zdir", "a.txt", "b.txt"]);

        sort_entries(&mut items, SortKey::Size, true);
        let names: Vec<&str> = items.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zdir", "adir", "a.txt", "b.txt"]);

        sort_entries(&mut items, SortKey::Date, false);
        let names: Vec<&str> = items.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zdir", "adir", "a.txt", "b.txt"]);
    }

    #[test]
    fn names_must_be_bare() {
        assert!(is_valid_name("reports"));
        assert!(!is_valid_name("a/b"));
        assert!(!is_valid_name(".."));
        assert!(!is_valid_name(".hidden"));
        assert!(!is_valid_name(""));
    }
}
