//! HTTP handlers for model views and file admins.

pub mod file;
pub mod model;
