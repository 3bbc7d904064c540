//! Model views: scaffolded list, form, details, actions, ajax and export endpoints.

pub mod actions;
pub mod ajax;
pub mod export;
mod format;
mod hooks;
mod view;

pub use actions::{ActionSpec, DeleteAction, ModelAction};
pub use ajax::AjaxModelLoader;
pub use format::{format_value, Formatter};
pub use hooks::{ModelViewHooks, NoHooks};
pub use view::{error_text, ColumnSpec, ListArgs, ModelView};
pub(crate) use view::url_with;
