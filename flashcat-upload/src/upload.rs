//! HTTP implementation of the core `Uploader` trait: one multipart POST per artifact to the site's intake.
//!
//! # Request layout
//!
//! `POST {site.upload_endpoint()}` with a `multipart/form-data` body:
//!
//! - `event`: JSON describing the build (service, version, variant, build id,
//!   file type and, when known, repository URL and commit);
//! - the artifact itself, under the field named by its [`ArtifactKind`];
//! - `repository`: the repository file, when one was written.
//!
//! The body is gzip-compressed unless disabled. Nothing is retried; the client
//! timeout is the only time limit.

use std::fs;
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use flashcat_upload_core::contract::{UploadRequest, Uploader};
use flashcat_upload_core::BoxError;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Serialize;
use uuid::Uuid;

pub const API_KEY_HEADER: &str = "FC-API-KEY";
pub const ORIGIN_HEADER: &str = "FC-EVP-ORIGIN";
pub const ORIGIN_VERSION_HEADER: &str = "FC-EVP-ORIGIN-VERSION";
pub const ORIGIN: &str = "flashcat-upload";

const NETWORK_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct UploadEvent<'a> {
    service: &'a str,
    version: &'a str,
    version_code: i64,
    variant: &'a str,
    build_id: &'a str,
    #[serde(rename = "type")]
    file_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    git_repository_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    git_commit_sha: Option<&'a str>,
}

/// A fully built request body.
#[derive(Debug)]
pub struct EncodedBody {
    pub content_type: String,
    pub gzipped: bool,
    pub bytes: Vec<u8>,
}

struct MultipartWriter {
    boundary: String,
    bytes: Vec<u8>,
}

impl MultipartWriter {
    fn new() -> Self {
        Self {
            boundary: format!("flashcat-{}", Uuid::new_v4().simple()),
            bytes: Vec::new(),
        }
    }

    fn part(&mut self, name: &str, file_name: &str, content_type: &str, content: &[u8]) {
        let header = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            self.boundary,
            quoted_param(name),
            quoted_param(file_name),
            content_type
        );
        self.bytes.extend_from_slice(header.as_bytes());
        self.bytes.extend_from_slice(content);
        self.bytes.extend_from_slice(b"\r\n");
    }

    fn finish(mut self) -> (String, Vec<u8>) {
        self.bytes
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.bytes,
        )
    }
}

/// Escapes a `Content-Disposition` parameter value. Line breaks are dropped.
fn quoted_param(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\r' | '\n' => {}
            c => escaped.push(c),
        }
    }
    escaped
}

/// Builds the multipart body for one request, compressing it if asked to.
pub fn encode_body(request: &UploadRequest<'_>) -> Result<EncodedBody, BoxError> {
    let artifact = request.artifact;
    let event = UploadEvent {
        service: &request.app.service_name,
        version: &request.app.version_name,
        version_code: request.app.version_code,
        variant: &request.app.variant,
        build_id: &request.app.build_id,
        file_type: artifact.kind.file_type(),
        git_repository_url: request.repository.map(|r| r.remote_url.as_str()),
        git_commit_sha: request.repository.map(|r| r.commit_hash.as_str()),
    };

    let mut writer = MultipartWriter::new();
    writer.part("event", "event", "application/json", &serde_json::to_vec(&event)?);

    let content = fs::read(&artifact.file)
        .map_err(|e| format!("Unable to read {}: {e}", artifact.file.display()))?;
    writer.part(
        artifact.kind.file_key(),
        &artifact.upload_file_name(),
        artifact.kind.encoding(),
        &content,
    );

    if let Some(repository_file) = request.repository_file {
        let repository = fs::read(repository_file).map_err(|e| {
            format!(
                "Unable to read repository file {}: {e}",
                repository_file.display()
            )
        })?;
        writer.part("repository", "repository", "application/json", &repository);
    }

    let (content_type, bytes) = writer.finish();
    if !request.gzip_enabled {
        return Ok(EncodedBody {
            content_type,
            gzipped: false,
            bytes,
        });
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&bytes)?;
    Ok(EncodedBody {
        content_type,
        gzipped: true,
        bytes: encoder.finish()?,
    })
}

pub struct HttpUploader {
    client: reqwest::Client,
}

impl HttpUploader {
    pub fn new() -> Result<Self, BoxError> {
        let client = reqwest::Client::builder()
            .timeout(NETWORK_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload<'a>(&self, request: UploadRequest<'a>) -> Result<(), BoxError> {
        let artifact = request.artifact;
        let body = encode_body(&request)?;
        let endpoint = request.site.upload_endpoint();

        if request.emulate_network_call {
            tracing::info!(
                endpoint = %endpoint,
                file = %artifact.file.display(),
                body_bytes = body.bytes.len(),
                gzipped = body.gzipped,
                "Network call emulated, nothing was sent"
            );
            return Ok(());
        }

        tracing::info!(
            endpoint = %endpoint,
            file = %artifact.file.display(),
            file_type = artifact.kind.file_type(),
            "Uploading file"
        );

        let mut builder = self
            .client
            .post(&endpoint)
            .header(API_KEY_HEADER, request.api_key)
            .header(ORIGIN_HEADER, ORIGIN)
            .header(ORIGIN_VERSION_HEADER, env!("CARGO_PKG_VERSION"))
            .header(CONTENT_TYPE, body.content_type);
        if body.gzipped {
            builder = builder.header(CONTENT_ENCODING, "gzip");
        }

        let response = builder.body(body.bytes).send().await.map_err(|e| {
            tracing::error!(error = ?e, endpoint = %endpoint, "Request failed");
            format!("Unable to upload {}: {e}", artifact.file.display())
        })?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(file = %artifact.file.display(), status = %status, "Upload succeeded");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(file = %artifact.file.display(), status = %status, body = %body, "Upload rejected");
        let file = artifact.file.display();
        let message = match status {
            StatusCode::FORBIDDEN => format!(
                "Unable to upload {file}: the API key is invalid or not allowed to upload to {} (403).",
                request.site
            ),
            StatusCode::PAYLOAD_TOO_LARGE => {
                format!("Unable to upload {file}: the file is too large (413).")
            }
            StatusCode::BAD_REQUEST => {
                format!("Unable to upload {file}: the request was rejected (400): {body}")
            }
            other => format!("Unable to upload {file}: unexpected status {other}: {body}"),
        };
        Err(message.into())
    }
}
