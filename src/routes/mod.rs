//! Route tables: one per view kind, plus common service routes.

mod common;
mod file;
mod model;

pub use common::common_routes;
pub use file::file_routes;
pub use model::model_routes;
