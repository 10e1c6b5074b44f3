use mime::Mime;
use regex::Regex;

use crate::{
    errors::{ConfigError, UploadError},
    naming::extension,
};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 5;

/// Headroom for multipart boundaries and headers on top of the file payloads.
const BODY_OVERHEAD: usize = 1024 * 1024;

pub const DEFAULT_ALLOWED_TYPES: &[(&str, &str)] = &[
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("png", "image/png"),
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("txt", "text/plain"),
];

/// Which files the service takes, and how many bytes of them.
///
/// The content-type check is deliberately loose: the declared type only has to
/// *contain* an allowed extension or MIME essence. Nothing inspects the bytes, so a
/// permitted extension paired with a forged content-type is accepted.
#[derive(Debug, Clone)]
pub struct AcceptancePolicy {
    allowed: Vec<(String, Mime)>,
    content_type_pattern: Regex,
    max_file_size: u64,
    max_files: usize,
}

impl AcceptancePolicy {
    pub fn new(
        allowed: &[(&str, &str)],
        max_file_size: u64,
        max_files: usize,
    ) -> Result<Self, ConfigError> {
        let allowed = allowed
            .iter()
            .map(|(ext, mime)| -> Result<(String, Mime), ConfigError> {
                Ok((ext.to_lowercase(), mime.parse()?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut tokens: Vec<String> = Vec::new();
        for (ext, mime) in &allowed {
            for token in [ext.as_str(), mime.essence_str()] {
                if !tokens.iter().any(|t| t == token) {
                    tokens.push(token.to_string());
                }
            }
        }
        let alternatives: Vec<String> = tokens.iter().map(|t| regex::escape(t)).collect();
        let content_type_pattern = Regex::new(&format!("(?i){}", alternatives.join("|")))?;

        Ok(Self {
            allowed,
            content_type_pattern,
            max_file_size,
            max_files,
        })
    }

    /// Images and documents, 5 MiB per file, 5 files per batch.
    pub fn standard() -> Result<Self, ConfigError> {
        Self::new(DEFAULT_ALLOWED_TYPES, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_FILES)
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    /// Largest request body a full batch can legitimately produce.
    pub fn max_request_body(&self) -> usize {
        let per_file = usize::try_from(self.max_file_size).unwrap_or(usize::MAX);
        per_file
            .saturating_mul(self.max_files.max(1))
            .saturating_add(BODY_OVERHEAD)
    }

    pub fn accepts(&self, original_name: &str, content_type: &str) -> bool {
        let extension_ok = extension(original_name)
            .is_some_and(|ext| self.allowed.iter().any(|(allowed, _)| *allowed == ext));

        extension_ok && self.content_type_pattern.is_match(content_type)
    }

    pub fn check(&self, original_name: &str, content_type: &str) -> Result<(), UploadError> {
        if self.accepts(original_name, content_type) {
            Ok(())
        } else {
            Err(UploadError::RejectedFileType {
                allowed: self.allowed_list(),
            })
        }
    }

    /// Comma separated allowed extensions, for error messages.
    pub fn allowed_list(&self) -> String {
        self.allowed
            .iter()
            .map(|(ext, _)| ext.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Content-Type a stored file is served back with.
    pub fn content_type_for(&self, stored_name: &str) -> Mime {
        extension(stored_name)
            .and_then(|ext| {
                self.allowed
                    .iter()
                    .find(|(allowed, _)| *allowed == ext)
                    .map(|(_, mime)| mime.clone())
            })
            .unwrap_or(mime::APPLICATION_OCTET_STREAM)
    }
}
