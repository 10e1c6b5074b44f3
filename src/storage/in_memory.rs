use super::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Location reported for the in-memory backend; nothing is written to disk.
const MEMORY_ROOT: &str = "memory";

#[derive(Clone, Default)]
pub struct InMemoryStorage {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn ensure_dir(&self) -> Result<PathBuf, UploadError> {
        Ok(PathBuf::from(MEMORY_ROOT))
    }

    async fn create(&self, name: &str) -> Result<Box<dyn PendingFile>, UploadError> {
        Ok(Box::new(InMemoryPendingFile {
            name: name.to_string(),
            buffer: Vec::new(),
            files: Arc::clone(&self.files),
        }))
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, UploadError> {
        self.files
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or(UploadError::NotFound)
    }

    async fn list(&self) -> Result<Vec<String>, UploadError> {
        let mut names: Vec<String> = self.files.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<(), UploadError> {
        self.files
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or(UploadError::NotFound)
    }
}

struct InMemoryPendingFile {
    name: String,
    buffer: Vec<u8>,
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

#[async_trait]
impl PendingFile for InMemoryPendingFile {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), UploadError> {
        let InMemoryPendingFile {
            name,
            buffer,
            files,
        } = *self;
        files.write().await.insert(name, buffer);
        Ok(())
    }

    async fn abort(self: Box<Self>) {}
}
