mod in_memory;
mod local_fs;

pub use in_memory::InMemoryStorage;
pub use local_fs::LocalFileStorage;

use crate::errors::UploadError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Flat directory of stored files, addressed by generated name.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Creates the upload directory if it is missing and returns where it lives.
    /// Safe to call on every request.
    async fn ensure_dir(&self) -> Result<PathBuf, UploadError>;
    /// Starts writing `name`. Nothing is visible under `name` until the write commits.
    async fn create(&self, name: &str) -> Result<Box<dyn PendingFile>, UploadError>;
    async fn get(&self, name: &str) -> Result<Vec<u8>, UploadError>;
    async fn list(&self) -> Result<Vec<String>, UploadError>;
    async fn delete(&self, name: &str) -> Result<(), UploadError>;
}

/// A write in progress. Dropping it without `commit` or `abort` may leave
/// a partial file behind on disk, so callers always finish with one of them.
#[async_trait]
pub trait PendingFile: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UploadError>;
    /// Publishes the file under its name. A failed commit cleans up after itself.
    async fn commit(self: Box<Self>) -> Result<(), UploadError>;
    async fn abort(self: Box<Self>);
}
