//! The upload task: resolve configuration, detect repositories, upload every
//! artifact, report.
//!
//! The run is linear:
//!
//! 1. apply the CI config file and the environment, then validate
//!    ([`crate::config::resolve`]); any failure stops the run before the network;
//! 2. ask the [`ArtifactProvider`] for files; none is a warning, not a failure;
//! 3. detect repositories once, over deduplicated source roots, and write the
//!    repository file if any were found;
//! 4. upload artifacts one at a time, in discovery order. A failed upload is
//!    recorded and the next artifact is still attempted;
//! 5. collapse the recorded failures: none is success, one is returned as is,
//!    several become [`UploadTaskError::MultipleUploads`].
//!
//! Nothing is retried.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::config::{self, ApiKey, ResolverInput};
use crate::contract::{
    AppIdentity, ArtifactProvider, ArtifactToUpload, RepositoryDetector, UploadRequest, Uploader,
};
use crate::error::{BoxError, UploadTaskError};
use crate::repository::{unique_source_roots, write_repository_file};
use crate::site::FlashcatSite;

/// Settings of one upload run. Built once, before the run starts.
#[derive(Debug, Clone)]
pub struct UploadTaskConfig {
    pub api_key: ApiKey,
    /// Explicit site name (`CN`, `STAGING`).
    pub site: Option<String>,
    /// Site hostname taken from `FLASHCAT_SITE`.
    pub environment_site: Option<String>,
    pub ci_config_file: Option<PathBuf>,
    pub app: AppIdentity,
    pub source_roots: Vec<PathBuf>,
    /// Overrides the remote URL of every detected repository.
    pub remote_repository_url: Option<String>,
    /// Where the repository file is written when repositories are found.
    pub repository_file: PathBuf,
    pub gzip_enabled: bool,
    pub emulate_network_call: bool,
}

impl Default for UploadTaskConfig {
    fn default() -> Self {
        Self {
            api_key: ApiKey::default(),
            site: None,
            environment_site: None,
            ci_config_file: None,
            app: AppIdentity::default(),
            source_roots: Vec::new(),
            remote_repository_url: None,
            repository_file: PathBuf::from("build/flashcat/repository.json"),
            gzip_enabled: true,
            emulate_network_call: false,
        }
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub site: FlashcatSite,
    pub uploaded: Vec<ArtifactToUpload>,
    /// Set when repositories were detected and the file was written.
    pub repository_file: Option<PathBuf>,
}

pub async fn run_upload_task<A, R, U>(
    config: &UploadTaskConfig,
    artifacts: &A,
    detector: &R,
    uploader: &U,
) -> Result<UploadReport, UploadTaskError>
where
    A: ArtifactProvider + ?Sized,
    R: RepositoryDetector + ?Sized,
    U: Uploader + ?Sized,
{
    let resolved = config::resolve(ResolverInput {
        api_key: &config.api_key,
        site: config.site.as_deref(),
        environment_site: config.environment_site.as_deref(),
        ci_config_file: config.ci_config_file.as_deref(),
        build_id: &config.app.build_id,
    })?;
    info!(site = %resolved.site, api_key_source = ?resolved.api_key.source, "Configuration resolved");

    let files = artifacts.files();
    if files.is_empty() {
        warn!("No mapping files to upload.");
        return Ok(UploadReport {
            site: resolved.site,
            uploaded: Vec::new(),
            repository_file: None,
        });
    }

    let source_roots = unique_source_roots(&config.source_roots);
    let repositories = detector.detect_repositories(
        &source_roots,
        config
            .remote_repository_url
            .as_deref()
            .filter(|url| !url.trim().is_empty()),
    );

    let repository_file: Option<&Path> = if repositories.is_empty() {
        info!("No repository detected, the upload will not reference source code");
        None
    } else {
        write_repository_file(&config.repository_file, &repositories).map_err(|source| {
            UploadTaskError::RepositoryFile {
                path: config.repository_file.clone(),
                source,
            }
        })?;
        Some(config.repository_file.as_path())
    };

    let mut failures: Vec<BoxError> = Vec::new();
    let mut uploaded = Vec::with_capacity(files.len());

    for artifact in &files {
        info!(
            file_type = artifact.kind.file_type(),
            file = %artifact.file.display(),
            "Uploading file"
        );
        let request = UploadRequest {
            site: resolved.site,
            artifact,
            repository_file,
            api_key: &resolved.api_key.value,
            app: &config.app,
            repository: repositories.first(),
            gzip_enabled: config.gzip_enabled,
            emulate_network_call: config.emulate_network_call,
        };
        match uploader.upload(request).await {
            Ok(()) => uploaded.push(artifact.clone()),
            Err(e) => {
                error!(file = %artifact.file.display(), error = %e, "Upload failed");
                failures.push(e);
            }
        }
    }

    match failures.len() {
        0 => Ok(UploadReport {
            site: resolved.site,
            uploaded,
            repository_file: repository_file.map(Path::to_path_buf),
        }),
        1 => Err(UploadTaskError::Upload(failures.remove(0))),
        _ => Err(UploadTaskError::MultipleUploads(failures)),
    }
}
