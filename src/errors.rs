use std::{io, path::PathBuf};

use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Everything that can go wrong while receiving, validating or storing a file.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid file type. Only images and documents are allowed ({allowed}).")]
    RejectedFileType { allowed: String },
    #[error("File too large. The maximum size is {limit} bytes.")]
    FileTooLarge { limit: u64 },
    #[error("Too many files. At most {limit} files can be uploaded at once.")]
    TooManyFiles { limit: usize },
    #[error("No file uploaded")]
    NoFileProvided,
    #[error("Unexpected field: {0}")]
    UnexpectedField(String),
    #[error("Malformed upload: {0}")]
    Malformed(String),
    #[error("Request body exceeds the maximum allowed size")]
    RequestTooLarge,
    #[error("Invalid file name: {0}")]
    InvalidName(String),
    #[error("File not found")]
    NotFound,
    #[error("could not prepare upload directory {}: {source}", .path.display())]
    StorageInit { path: PathBuf, source: io::Error },
    #[error("could not write {name}: {source}")]
    WriteFailed { name: String, source: io::Error },
}

impl UploadError {
    /// Operational failures are the server's fault; everything else the client can fix.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            UploadError::StorageInit { .. } | UploadError::WriteFailed { .. }
        )
    }
}

impl From<MultipartError> for UploadError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::RequestTooLarge
        } else {
            UploadError::Malformed(err.body_text())
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value:?}")]
    InvalidVar { key: &'static str, value: String },
    #[error("invalid allow-list pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("invalid MIME type in allow-list: {0}")]
    Mime(#[from] mime::FromStrError),
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] UploadError),
    #[error("server error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Internal server error")]
    Internal,
    #[error("File not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    PayloadTooLarge(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::NotFound => ApiError::NotFound,
            UploadError::FileTooLarge { .. } | UploadError::RequestTooLarge => {
                ApiError::PayloadTooLarge(err.to_string())
            }
            UploadError::StorageInit { .. } | UploadError::WriteFailed { .. } => {
                tracing::error!(error = %err, "upload failed");
                ApiError::Internal
            }
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: self.to_string(),
        };

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operational_errors_hide_their_detail() {
        let err = UploadError::WriteFailed {
            name: "1-2.txt".to_string(),
            source: io::Error::other("disk full"),
        };
        assert!(err.is_operational());

        let api = ApiError::from(err);
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.to_string(), "Internal server error");
    }

    #[test]
    fn client_errors_keep_their_message() {
        let api = ApiError::from(UploadError::TooManyFiles { limit: 5 });
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        assert!(api.to_string().contains("At most 5 files"));

        let api = ApiError::from(UploadError::FileTooLarge { limit: 10 });
        assert_eq!(api.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ApiError::from(UploadError::NotFound).status(), StatusCode::NOT_FOUND);
    }
}
