use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, Path,
        multipart::{Field, MultipartRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use http::HeaderValue;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    errors::{ApiError, UploadError},
    pipeline::{BufferedBody, ByteSource, StoredFile, UploadPipeline, UploadRequest},
    storage::Storage,
};

const SINGLE_FIELD: &str = "file";
const BATCH_FIELD: &str = "files";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub fn create_app(pipeline: Arc<UploadPipeline>) -> Router {
    let api = Router::new()
        .route("/upload", post(upload))
        .route("/uploads", post(upload_many))
        .layer(DefaultBodyLimit::max(pipeline.policy().max_request_body()));

    Router::new()
        .route("/", get(health))
        .route("/uploads/{name}", get(get_file))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(Extension(pipeline)),
        )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub file_path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadResponse {
    pub success: bool,
    pub message: String,
    pub file_paths: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FileFailure>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    pub file_name: String,
    pub message: String,
}

#[async_trait]
impl<'a> ByteSource for Field<'a> {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, UploadError> {
        Ok(self.chunk().await?)
    }
}

async fn health() -> &'static str {
    "Server is running!"
}

async fn upload(
    Extension(pipeline): Extension<Arc<UploadPipeline>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| no_files(rejection, "No file uploaded"))?;

    let result = receive_single(&pipeline, &mut multipart).await;
    if result.is_err() {
        drain(&mut multipart).await;
    }
    let stored = result?;

    Ok(Json(UploadResponse {
        success: true,
        message: "File uploaded successfully".to_string(),
        file_path: stored.public_path,
    }))
}

/// Streams the `file` field straight into the pipeline. When the request fails after
/// the file was stored, the stored file is discarded.
async fn receive_single(
    pipeline: &UploadPipeline,
    multipart: &mut Multipart,
) -> Result<StoredFile, UploadError> {
    let mut stored: Option<StoredFile> = None;

    match store_single_field(pipeline, multipart, &mut stored).await {
        Ok(()) => stored.ok_or(UploadError::NoFileProvided),
        Err(err) => {
            if let Some(stored) = stored.take() {
                pipeline.discard(&stored).await;
            }
            Err(err)
        }
    }
}

async fn store_single_field(
    pipeline: &UploadPipeline,
    multipart: &mut Multipart,
    stored: &mut Option<StoredFile>,
) -> Result<(), UploadError> {
    while let Some(field) = multipart.next_field().await? {
        // Plain form fields carry no file name and are ignored.
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let field_name = field.name().unwrap_or_default().to_owned();

        if field_name != SINGLE_FIELD || stored.is_some() {
            return Err(UploadError::UnexpectedField(field_name));
        }

        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_owned();
        let request = UploadRequest::new(file_name, content_type, field);
        *stored = Some(pipeline.process_single(request).await?);
    }

    Ok(())
}

/// Stores up to `max_files` files from the `files` field.
///
/// When some files fail, the response has `success: false` and the status of the worst
/// failure, but every path in `filePaths` was stored and stays retrievable. Clients
/// only need to resend the files listed under `errors`.
async fn upload_many(
    Extension(pipeline): Extension<Arc<UploadPipeline>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart.map_err(|rejection| no_files(rejection, "No files uploaded"))?;

    let received = receive_batch(&pipeline, &mut multipart).await;
    drain(&mut multipart).await;

    let items = match pipeline
        .process_batch(received?, pipeline.policy().max_files())
        .await
    {
        Ok(items) => items,
        Err(UploadError::NoFileProvided) => {
            return Err(ApiError::BadRequest("No files uploaded".to_string()));
        }
        Err(err) => return Err(err.into()),
    };

    let mut file_paths = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    let mut status = StatusCode::OK;

    for item in items {
        match item.result {
            Ok(stored) => file_paths.push(stored.public_path),
            Err(err) => {
                let err = ApiError::from(err);
                if status == StatusCode::OK || err.status().as_u16() > status.as_u16() {
                    status = err.status();
                }
                errors.push(FileFailure {
                    file_name: item.original_name,
                    message: err.to_string(),
                });
            }
        }
    }

    let success = errors.is_empty();
    let message = if success {
        "Files uploaded successfully"
    } else {
        "Some files could not be uploaded"
    };
    let body = BatchUploadResponse {
        success,
        message: message.to_string(),
        file_paths,
        errors,
    };

    Ok((status, Json(body)).into_response())
}

/// Buffers the `files` fields, each capped just past the size limit so the pipeline
/// can still tell an oversized file apart. Reading stops one field past the count
/// limit; the pipeline refuses such a batch before storing anything.
async fn receive_batch(
    pipeline: &UploadPipeline,
    multipart: &mut Multipart,
) -> Result<Vec<UploadRequest<BufferedBody>>, UploadError> {
    let policy = pipeline.policy();
    let cap = policy.max_file_size().saturating_add(1);
    let mut requests = Vec::new();

    while let Some(mut field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let field_name = field.name().unwrap_or_default().to_owned();
        if field_name != BATCH_FIELD {
            return Err(UploadError::UnexpectedField(field_name));
        }

        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_owned();
        let body = BufferedBody::read_capped(&mut field, cap).await?;
        requests.push(UploadRequest::new(file_name, content_type, body));

        if requests.len() > policy.max_files() {
            break;
        }
    }

    Ok(requests)
}

/// A body that is not multipart carries no files.
fn no_files(rejection: MultipartRejection, message: &str) -> ApiError {
    tracing::debug!(%rejection, "request body is not multipart");
    ApiError::BadRequest(message.to_string())
}

/// Consumes whatever is left of the body so the client reads our response
/// instead of a reset connection.
async fn drain(multipart: &mut Multipart) {
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }
}

async fn get_file(
    Path(name): Path<String>,
    Extension(pipeline): Extension<Arc<UploadPipeline>>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = pipeline.storage().get(&name).await?;

    let content_type = pipeline.policy().content_type_for(&name);
    let content_type =
        HeaderValue::from_str(content_type.as_ref()).map_err(|_| ApiError::Internal)?;

    Ok(([(header::CONTENT_TYPE, content_type)], Bytes::from(bytes)))
}
