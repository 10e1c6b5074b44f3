use super::*;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const PARTIAL_SUFFIX: &str = ".partial";

pub struct LocalFileStorage {
    storage_path: PathBuf,
}

impl LocalFileStorage {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
        }
    }

    /// Maps a stored name to its path, refusing anything that could leave the directory
    /// or reach an unfinished write.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && !name.contains("..")
            && !name.ends_with(PARTIAL_SUFFIX);

        plain.then(|| self.storage_path.join(name))
    }
}

#[async_trait]
impl Storage for LocalFileStorage {
    async fn ensure_dir(&self) -> Result<PathBuf, UploadError> {
        let init_error = |source| UploadError::StorageInit {
            path: self.storage_path.clone(),
            source,
        };

        fs::create_dir_all(&self.storage_path)
            .await
            .map_err(init_error)?;
        fs::canonicalize(&self.storage_path)
            .await
            .map_err(init_error)
    }

    async fn create(&self, name: &str) -> Result<Box<dyn PendingFile>, UploadError> {
        let path = self
            .resolve(name)
            .ok_or_else(|| UploadError::InvalidName(name.to_string()))?;
        let partial = self.storage_path.join(format!("{name}{PARTIAL_SUFFIX}"));

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial)
            .await
            .map_err(|source| UploadError::WriteFailed {
                name: name.to_string(),
                source,
            })?;

        Ok(Box::new(LocalPendingFile {
            name: name.to_string(),
            file,
            partial,
            path,
        }))
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, UploadError> {
        let path = self.resolve(name).ok_or(UploadError::NotFound)?;

        fs::read(&path).await.map_err(|_| UploadError::NotFound)
    }

    async fn list(&self) -> Result<Vec<String>, UploadError> {
        let mut entries = fs::read_dir(&self.storage_path)
            .await
            .map_err(|source| UploadError::StorageInit {
                path: self.storage_path.clone(),
                source,
            })?;

        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(|source| {
            UploadError::StorageInit {
                path: self.storage_path.clone(),
                source,
            }
        })? {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();

            if !file_name.ends_with(PARTIAL_SUFFIX) {
                files.push(file_name.to_string());
            }
        }

        files.sort();
        Ok(files)
    }

    async fn delete(&self, name: &str) -> Result<(), UploadError> {
        let path = self.resolve(name).ok_or(UploadError::NotFound)?;

        fs::remove_file(path).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => UploadError::NotFound,
            _ => UploadError::WriteFailed {
                name: name.to_string(),
                source: err,
            },
        })
    }
}

struct LocalPendingFile {
    name: String,
    file: fs::File,
    partial: PathBuf,
    path: PathBuf,
}

impl LocalPendingFile {
    fn failed(&self, source: std::io::Error) -> UploadError {
        UploadError::WriteFailed {
            name: self.name.clone(),
            source,
        }
    }
}

#[async_trait]
impl PendingFile for LocalPendingFile {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|err| self.failed(err))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), UploadError> {
        let synced = match self.file.flush().await {
            Ok(()) => self.file.sync_all().await,
            Err(err) => Err(err),
        };
        let published = match synced {
            Ok(()) => fs::rename(&self.partial, &self.path).await,
            Err(err) => Err(err),
        };

        match published {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = self.failed(err);
                remove_partial(&self.partial).await;
                Err(err)
            }
        }
    }

    async fn abort(self: Box<Self>) {
        let LocalPendingFile { file, partial, .. } = *self;
        drop(file);
        remove_partial(&partial).await;
    }
}

async fn remove_partial(partial: &Path) {
    if let Err(err) = fs::remove_file(partial).await {
        if err.kind() != ErrorKind::NotFound {
            tracing::warn!(
                path = %partial.display(),
                error = %err,
                "could not remove partial upload"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn ensure_dir_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(tmp.path().join("nested/uploads"));

        let first = storage.ensure_dir().await.unwrap();
        std::fs::write(first.join("keep.txt"), b"x").unwrap();
        for _ in 0..3 {
            assert_eq!(storage.ensure_dir().await.unwrap(), first);
        }

        assert!(first.is_absolute());
        assert_eq!(storage.list().await.unwrap(), vec!["keep.txt".to_string()]);
    }

    #[tokio::test]
    async fn ensure_dir_fails_when_path_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("uploads");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let err = LocalFileStorage::new(&blocker).ensure_dir().await.unwrap_err();
        assert!(matches!(err, UploadError::StorageInit { .. }));
    }

    #[tokio::test]
    async fn pending_write_is_invisible_until_commit() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(tmp.path());
        storage.ensure_dir().await.unwrap();

        let mut pending = storage.create("1-1.txt").await.unwrap();
        pending.write_chunk(b"hello ").await.unwrap();
        assert!(storage.list().await.unwrap().is_empty());
        assert!(matches!(
            storage.get("1-1.txt").await,
            Err(UploadError::NotFound)
        ));

        pending.write_chunk(b"world").await.unwrap();
        pending.commit().await.unwrap();

        assert!(tmp.path().join("1-1.txt").is_file());
        assert_eq!(storage.get("1-1.txt").await.unwrap(), b"hello world");
        assert_eq!(storage.list().await.unwrap(), vec!["1-1.txt".to_string()]);
    }

    #[tokio::test]
    async fn abort_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(tmp.path());
        storage.ensure_dir().await.unwrap();

        let mut pending = storage.create("1-2.pdf").await.unwrap();
        pending.write_chunk(b"%PDF-1.7").await.unwrap();
        pending.abort().await;

        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn refuses_names_outside_the_directory() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(tmp.path().join("uploads"));
        storage.ensure_dir().await.unwrap();
        std::fs::write(tmp.path().join("secret.txt"), b"secret").unwrap();

        for name in ["../secret.txt", "..", "a/b.txt", "a\\b.txt", "1-1.txt.partial", ""] {
            assert!(
                matches!(storage.get(name).await, Err(UploadError::NotFound)),
                "{name} resolved"
            );
        }
        assert!(matches!(
            storage.create("../escape.txt").await,
            Err(UploadError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_a_stored_file() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(tmp.path());
        storage.ensure_dir().await.unwrap();

        let mut pending = storage.create("1-3.png").await.unwrap();
        pending.write_chunk(b"png").await.unwrap();
        pending.commit().await.unwrap();

        storage.delete("1-3.png").await.unwrap();
        assert!(matches!(
            storage.delete("1-3.png").await,
            Err(UploadError::NotFound)
        ));
        assert!(storage.list().await.unwrap().is_empty());
    }
}
