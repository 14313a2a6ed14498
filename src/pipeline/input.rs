//! Input resolution: turn a user-supplied path or URL into document bytes.
//!
//! The rasteriser works on an in-memory buffer, so URLs are downloaded
//! straight into memory; no temp file is involved. Downloads are capped at
//! the configured document size: a larger `Content-Length` is refused up
//! front and the body is read chunk by chunk until the cap is passed. Type
//! checks are left to [`crate::pipeline::render::Rasterizer::validate`] so
//! that every caller, not only the CLI, goes through the same gate.

use crate::error::{RasterError, ReviewError};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

/// A document as submitted: file name, optional MIME type, raw bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a document from a local path or an HTTP(S) URL.
///
/// `max_bytes` bounds URL downloads; local files are checked later by the
/// rasteriser.
pub async fn load_document(
    input: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<SourceDocument, ReviewError> {
    if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<SourceDocument, ReviewError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => ReviewError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => ReviewError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());
    debug!("Read local document {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceDocument::new(name, bytes))
}

async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<SourceDocument, ReviewError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ReviewError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let failed = |e: reqwest::Error| {
        if e.is_timeout() {
            ReviewError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ReviewError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let mut response = client.get(url).send().await.map_err(failed)?;

    if !response.status().is_success() {
        return Err(ReviewError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let name = filename_from_url(url);
    if let Some(size) = response.content_length().filter(|&size| size > max_bytes) {
        return Err(too_large(name, size, max_bytes));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(failed)? {
        let size = (bytes.len() + chunk.len()) as u64;
        if size > max_bytes {
            return Err(too_large(name, size, max_bytes));
        }
        bytes.extend_from_slice(&chunk);
    }

    info!("Downloaded {} bytes", bytes.len());

    let mut document = SourceDocument::new(name, bytes);
    document.content_type = content_type;
    Ok(document)
}

/// `size` is what was announced or read so far, not the full body.
fn too_large(name: String, size: u64, max: u64) -> ReviewError {
    ReviewError::Validation {
        name,
        source: RasterError::TooLarge { size, max },
    }
}

/// Last path segment of the URL if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
