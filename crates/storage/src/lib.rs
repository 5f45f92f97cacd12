pub mod backend;
mod cache;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::cache::ResourceCache;
pub use crate::models::FileInfo;
pub use crate::path::{INDEX_FILE, from_url as path_for_url, validate as validate_path};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
