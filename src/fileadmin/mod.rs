//! File manager view: browse, upload, download and manage files under a storage root.

pub mod storage;
mod view;

pub use storage::{FileEntry, FileStorage, LocalFileStorage};
pub use view::FileAdmin;
