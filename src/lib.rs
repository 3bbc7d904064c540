//! adminkit: configuration-driven admin scaffolding for axum.
//!
//! Describe tables and views in JSON, resolve them into a model, and mount one
//! [`ModelView`] per table (list, create, edit, details, delete, actions, ajax, export)
//! plus [`FileAdmin`] file managers under a common url prefix.

pub mod admin;
pub mod backend;
pub mod config;
pub mod error;
pub mod extractors;
pub mod fileadmin;
pub mod filters;
pub mod form;
pub mod handlers;
pub mod model;
pub mod naming;
pub mod response;
pub mod routes;
pub mod settings;
pub mod sql;

pub use admin::{AccessPolicy, Admin, AdminView, AllowAll, MenuEntry, MenuItem, ViewMeta};
pub use backend::{MemoryBackend, ModelBackend, PgBackend};
pub use config::{load_from_dir, resolve, validate, AdminConfig, FileAdminConfig, ModelViewConfig, ResolvedEntity, ResolvedModel};
pub use error::{AppError, ConfigError, StorageError};
pub use fileadmin::{FileAdmin, FileStorage, LocalFileStorage};
pub use model::{ActionSpec, ModelAction, ModelView, ModelViewHooks};
pub use response::{error_body, success_one_ok, FlashMessage, Redirect};
pub use routes::common_routes;
pub use settings::{init_tracing, AdminSettings};
