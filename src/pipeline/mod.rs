//! Validation and storage of uploaded files, independent of the HTTP layer.
//!
//! Each file moves `Received -> Validated -> Stored`. It stops at `Rejected` when the
//! acceptance policy refuses it, or at `WriteFailed` when the size ceiling is crossed or
//! the disk fails; in both failure cases nothing is left in storage.

mod source;

pub use source::{BufferedBody, ByteSource};

use std::{path::PathBuf, sync::Arc};

use crate::{
    errors::UploadError,
    naming::{NameGenerator, TimestampNames},
    policy::AcceptancePolicy,
    storage::{PendingFile, Storage},
};

/// URL prefix stored files are served under.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// One incoming file.
pub struct UploadRequest<B> {
    pub original_name: String,
    pub content_type: String,
    pub body: B,
}

impl<B> UploadRequest<B> {
    pub fn new(
        original_name: impl Into<String>,
        content_type: impl Into<String>,
        body: B,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            content_type: content_type.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Generated name inside the storage directory.
    pub name: String,
    pub storage_path: PathBuf,
    pub public_path: String,
    pub size: u64,
}

/// Outcome of one file of a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub original_name: String,
    pub result: Result<StoredFile, UploadError>,
}

pub struct UploadPipeline {
    storage: Arc<dyn Storage>,
    policy: AcceptancePolicy,
    names: Arc<dyn NameGenerator>,
}

impl UploadPipeline {
    pub fn new(storage: Arc<dyn Storage>, policy: AcceptancePolicy) -> Self {
        Self {
            storage,
            policy,
            names: Arc::new(TimestampNames),
        }
    }

    /// Replaces the source of generated names.
    pub fn with_names(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.names = names;
        self
    }

    pub fn policy(&self) -> &AcceptancePolicy {
        &self.policy
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub async fn process_single<B>(
        &self,
        request: UploadRequest<B>,
    ) -> Result<StoredFile, UploadError>
    where
        B: ByteSource,
    {
        let UploadRequest {
            original_name,
            content_type,
            mut body,
        } = request;

        if let Err(err) = self.policy.check(&original_name, &content_type) {
            tracing::warn!(
                file = %original_name,
                content_type = %content_type,
                "rejected file type"
            );
            return Err(err);
        }
        tracing::debug!(file = %original_name, content_type = %content_type, "upload validated");

        let dir = self.storage.ensure_dir().await?;
        let name = self.names.generate(&original_name);
        let mut pending = self.storage.create(&name).await?;

        let limit = self.policy.max_file_size();
        let size = match copy_capped(&mut body, pending.as_mut(), limit).await {
            Ok(size) => size,
            Err(err) => {
                pending.abort().await;
                if err.is_operational() {
                    tracing::error!(
                        file = %original_name,
                        stored = %name,
                        error = %err,
                        "upload write failed"
                    );
                } else {
                    tracing::warn!(file = %original_name, error = %err, "upload aborted");
                }
                return Err(err);
            }
        };
        pending.commit().await?;

        tracing::info!(file = %original_name, stored = %name, size, "stored upload");

        Ok(StoredFile {
            storage_path: dir.join(&name),
            public_path: format!("{PUBLIC_PREFIX}/{name}"),
            name,
            size,
        })
    }

    /// Stores each file of a batch on its own.
    ///
    /// A batch larger than `max_count` is refused before any file is touched. Past
    /// that check, files succeed or fail independently and every outcome is reported
    /// in submission order.
    pub async fn process_batch<B>(
        &self,
        requests: Vec<UploadRequest<B>>,
        max_count: usize,
    ) -> Result<Vec<BatchItem>, UploadError>
    where
        B: ByteSource,
    {
        if requests.is_empty() {
            return Err(UploadError::NoFileProvided);
        }
        if requests.len() > max_count {
            tracing::warn!(count = requests.len(), max_count, "batch has too many files");
            return Err(UploadError::TooManyFiles { limit: max_count });
        }

        let mut items = Vec::with_capacity(requests.len());
        for request in requests {
            let original_name = request.original_name.clone();
            let result = self.process_single(request).await;
            items.push(BatchItem {
                original_name,
                result,
            });
        }
        Ok(items)
    }

    /// Removes a file this pipeline stored earlier in the same request.
    pub async fn discard(&self, stored: &StoredFile) {
        if let Err(err) = self.storage.delete(&stored.name).await {
            tracing::warn!(stored = %stored.name, error = %err, "could not discard upload");
        }
    }
}

async fn copy_capped<B>(
    body: &mut B,
    pending: &mut dyn PendingFile,
    limit: u64,
) -> Result<u64, UploadError>
where
    B: ByteSource + ?Sized,
{
    let mut written: u64 = 0;
    while let Some(chunk) = body.next_chunk().await? {
        written += chunk.len() as u64;
        if written > limit {
            return Err(UploadError::FileTooLarge { limit });
        }
        pending.write_chunk(&chunk).await?;
    }
    Ok(written)
}
