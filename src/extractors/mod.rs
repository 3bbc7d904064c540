//! Request extractors shared by admin views.

pub mod return_url;

pub use return_url::{is_safe_url, ReturnUrl};
