//! One-shot upload of the selected video.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::error::UploadError;

/// Multipart field the server reads the file from.
pub const FILE_FIELD: &str = "file";

/// Where the upload body comes from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Memory(Bytes),
    /// Streamed from disk at upload time. `len` is taken from metadata.
    File { path: PathBuf, len: u64 },
}

/// A file the user selected for upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub media_type: String,
    pub source: UploadSource,
}

impl UploadRequest {
    /// An upload whose contents are already in memory.
    pub fn new(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            source: UploadSource::Memory(bytes.into()),
        }
    }

    /// Describe a file on disk without reading it, guessing its media type
    /// from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file").into());
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self {
            file_name,
            media_type: media_type_for(path).to_string(),
            source: UploadSource::File {
                path: path.to_path_buf(),
                len: meta.len(),
            },
        })
    }

    /// Size of the body in bytes.
    pub fn len(&self) -> u64 {
        match &self.source {
            UploadSource::Memory(bytes) => bytes.len() as u64,
            UploadSource::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject files that are empty or not of an accepted media type.
    pub fn validate(&self, accepted_prefix: &str) -> Result<(), UploadError> {
        if self.is_empty() {
            return Err(UploadError::NoFileSelected);
        }
        if !self.media_type.starts_with(accepted_prefix) {
            return Err(UploadError::UnsupportedMediaType(self.media_type.clone()));
        }
        Ok(())
    }

    /// Build the multipart part, opening the file if the body lives on disk.
    async fn into_part(self) -> Result<Part, UploadError> {
        let len = self.len();
        let body = match self.source {
            UploadSource::Memory(bytes) => Body::from(bytes),
            UploadSource::File { path, .. } => {
                let file = tokio::fs::File::open(&path).await?;
                Body::wrap_stream(ReaderStream::new(file))
            }
        };
        Ok(Part::stream_with_length(body, len)
            .file_name(self.file_name)
            .mime_str(&self.media_type)?)
    }
}

/// Media type for common video container extensions.
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mpeg" | "mpg" => "video/mpeg",
        "ogv" => "video/ogg",
        "3gp" => "video/3gpp",
        "wmv" => "video/x-ms-wmv",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Server-assigned reference that keys the stream session.
    pub file_ref: String,
}

#[async_trait]
pub trait Transfer: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<UploadResult, UploadError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(alias = "filePath", alias = "file_ref", alias = "path")]
    file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(alias = "detail")]
    message: Option<Value>,
}

/// Multipart upload over HTTP. Makes exactly one attempt per call.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    http: reqwest::Client,
    url: Url,
    accepted_prefix: String,
}

impl HttpTransfer {
    pub fn new(config: &Config) -> Result<Self, UploadError> {
        let url = config
            .upload_url()
            .map_err(|e| UploadError::Network(format!("invalid upload url: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(config.upload_timeout())
            .build()?;
        Ok(Self {
            http,
            url,
            accepted_prefix: config.accepted_media_prefix.clone(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transfer for HttpTransfer {
    async fn upload(&self, request: UploadRequest) -> Result<UploadResult, UploadError> {
        request.validate(&self.accepted_prefix)?;
        info!(
            file = %request.file_name,
            bytes = request.len(),
            url = %self.url,
            "uploading"
        );

        let form = Form::new().part(FILE_FIELD, request.into_part().await?);
        let resp = self
            .http
            .post(self.url.clone())
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        debug!(%status, "upload response");

        if !status.is_success() {
            let body = resp.text().await?;
            let message = rejection_message(&body).unwrap_or_else(|| status.to_string());
            return Err(UploadError::Rejected(message));
        }

        let parsed = resp.json::<UploadResponse>().await.map_err(|e| {
            if e.is_decode() {
                UploadError::MalformedResponse(e.to_string())
            } else {
                UploadError::from(e)
            }
        })?;
        upload_result(parsed)
    }
}

/// Extract the file reference from a 2xx body.
fn upload_result(parsed: UploadResponse) -> Result<UploadResult, UploadError> {
    match parsed.file_path {
        Some(file_ref) if !file_ref.trim().is_empty() => Ok(UploadResult { file_ref }),
        _ => Err(UploadError::MalformedResponse(
            "response has no file reference".to_string(),
        )),
    }
}

/// Human-readable message from a failure body, if there is one.
fn rejection_message(body: &str) -> Option<String> {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            message: Some(Value::String(s)),
        }) => Some(s),
        Ok(ErrorResponse {
            message: Some(other),
        }) => Some(other.to_string()),
        _ => {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_file() {
        let req = UploadRequest::new("a.mp4", "video/mp4", Vec::new());
        assert!(matches!(
            req.validate("video/"),
            Err(UploadError::NoFileSelected)
        ));
    }

    #[test]
    fn test_validate_rejects_non_video() {
        let req = UploadRequest::new("notes.txt", "text/plain", b"hello".to_vec());
        match req.validate("video/") {
            Err(UploadError::UnsupportedMediaType(m)) => assert_eq!(m, "text/plain"),
            other => panic!("Expected UnsupportedMediaType, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_accepts_video() {
        let req = UploadRequest::new("clip.mp4", "video/mp4", b"\x00\x00\x00\x18ftyp".to_vec());
        assert!(req.validate("video/").is_ok());
    }

    #[test]
    fn test_media_type_for_extensions() {
        assert_eq!(media_type_for(Path::new("a/b/clip.MP4")), "video/mp4");
        assert_eq!(media_type_for(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(media_type_for(Path::new("clip.webm")), "video/webm");
        assert_eq!(media_type_for(Path::new("README")), "application/octet-stream");
    }

    fn parse(body: &str) -> Result<UploadResult, UploadError> {
        serde_json::from_str::<UploadResponse>(body)
            .map_err(|e| UploadError::MalformedResponse(e.to_string()))
            .and_then(upload_result)
    }

    #[test]
    fn test_upload_response_aliases() {
        for body in [
            r#"{"file_path":"uploads/abc.mp4"}"#,
            r#"{"filePath":"uploads/abc.mp4","message":"ok"}"#,
            r#"{"path":"uploads/abc.mp4"}"#,
        ] {
            assert_eq!(parse(body).unwrap().file_ref, "uploads/abc.mp4");
        }
    }

    #[test]
    fn test_upload_response_without_reference() {
        assert!(matches!(
            parse(r#"{"message":"File uploaded successfully"}"#),
            Err(UploadError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse(r#"{"file_path":"  "}"#),
            Err(UploadError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_from_path_reads_only_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mov");
        std::fs::write(&path, vec![7u8; 4096]).unwrap();

        let req = UploadRequest::from_path(&path).await.unwrap();
        assert_eq!(req.file_name, "clip.mov");
        assert_eq!(req.media_type, "video/quicktime");
        assert_eq!(req.len(), 4096);
        match &req.source {
            UploadSource::File { path: p, len } => {
                assert_eq!(p, &path);
                assert_eq!(*len, 4096);
            }
            other => panic!("Expected a file source, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_from_path_empty_file_is_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mp4");
        std::fs::write(&path, b"").unwrap();

        let req = UploadRequest::from_path(&path).await.unwrap();
        assert!(matches!(
            req.validate("video/"),
            Err(UploadError::NoFileSelected)
        ));
    }

    #[tokio::test]
    async fn test_from_path_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            UploadRequest::from_path(dir.path()).await,
            Err(UploadError::Io(_))
        ));
    }

    #[test]
    fn test_rejection_message_variants() {
        assert_eq!(
            rejection_message(r#"{"message":"Failed to upload file"}"#).as_deref(),
            Some("Failed to upload file")
        );
        assert_eq!(
            rejection_message(r#"{"detail":"Not Found"}"#).as_deref(),
            Some("Not Found")
        );
        assert_eq!(
            rejection_message("Internal Server Error").as_deref(),
            Some("Internal Server Error")
        );
        assert_eq!(rejection_message(""), None);
    }
}
