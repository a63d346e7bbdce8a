//! Seams between the upload task and its collaborators.
//!
//! The task itself never touches the network or scans build outputs. It talks to
//! three traits, each implemented for real by the CLI crate or by
//! [`crate::repository::GitRepositoryDetector`] / [`crate::artifact::FileArtifacts`],
//! and by `mockall` mocks in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::BoxError;
use crate::repository::RepositoryInfo;
use crate::site::FlashcatSite;

/// Identity of the build the artifacts belong to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AppIdentity {
    pub service_name: String,
    pub version_name: String,
    pub version_code: i64,
    pub variant: String,
    /// Must be non-empty before anything is uploaded.
    pub build_id: String,
}

/// Kind of a file to upload. Decides the multipart field, the wire `type` and the content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// R8/Proguard obfuscation mapping.
    JvmMappingFile,
    /// Native debug symbols (`.so` with symbols).
    NdkSymbolFile,
}

impl ArtifactKind {
    /// Multipart field name of the file part.
    pub fn file_key(self) -> &'static str {
        match self {
            ArtifactKind::JvmMappingFile => "jvm_mapping_file",
            ArtifactKind::NdkSymbolFile => "ndk_symbol_file",
        }
    }

    /// Value of the `type` attribute of the upload event.
    pub fn file_type(self) -> &'static str {
        self.file_key()
    }

    pub fn encoding(self) -> &'static str {
        match self {
            ArtifactKind::JvmMappingFile => "text/plain",
            ArtifactKind::NdkSymbolFile => "application/octet-stream",
        }
    }
}

/// One file to upload, in the order artifact discovery produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactToUpload {
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub file: PathBuf,
}

impl ArtifactToUpload {
    pub fn new(kind: ArtifactKind, file: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            file: file.into(),
        }
    }

    /// File name sent with the file part.
    pub fn upload_file_name(&self) -> String {
        match self.kind {
            ArtifactKind::JvmMappingFile => "jvm_mapping".to_string(),
            ArtifactKind::NdkSymbolFile => self
                .file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.kind.file_key().to_string()),
        }
    }
}

/// Everything one upload call needs.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub site: FlashcatSite,
    pub artifact: &'a ArtifactToUpload,
    /// Descriptor file, present only when repositories were detected.
    pub repository_file: Option<&'a Path>,
    pub api_key: &'a str,
    pub app: &'a AppIdentity,
    /// First detected repository, used to tag the upload with its URL and commit.
    pub repository: Option<&'a RepositoryInfo>,
    pub gzip_enabled: bool,
    /// Build the request but do not send it.
    pub emulate_network_call: bool,
}

/// Uploads a single artifact to Flashcat.
///
/// Called exactly once per artifact. Timeouts are up to the implementation.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload<'a>(&self, request: UploadRequest<'a>) -> Result<(), BoxError>;
}

/// Produces the files to upload for the current build.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ArtifactProvider {
    fn files(&self) -> Vec<ArtifactToUpload>;
}

/// Inspects source roots for version control metadata.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait RepositoryDetector {
    /// Never fails: roots without metadata simply contribute nothing.
    /// `explicit_remote_url` replaces the discovered remote of every repository.
    fn detect_repositories<'a>(
        &self,
        source_roots: &[PathBuf],
        explicit_remote_url: Option<&'a str>,
    ) -> Vec<RepositoryInfo>;
}
