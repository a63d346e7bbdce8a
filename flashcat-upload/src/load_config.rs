/// `load_config` module: loads the YAML task file describing one upload run and
/// adapts it, together with command line flags and the environment, into the
/// core [`UploadTaskConfig`].
///
/// # Responsibilities
/// - Parse the task file into [`TaskFile`]
/// - Resolve relative paths against the task file's directory
/// - Read the build id from `build_id_file` when no inline `build_id` is given
/// - Fold the API key inputs into a single credential with its source
///
/// Validation of the resolved values (API key format, site name, build id) is
/// left to the core resolver so it runs in exactly one place.
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use flashcat_upload_core::config::{self, ApiKey};
use flashcat_upload_core::contract::{AppIdentity, ArtifactToUpload};
use flashcat_upload_core::upload_task::UploadTaskConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

const DEFAULT_REPOSITORY_FILE: &str = "build/flashcat/repository.json";

#[derive(Debug, Deserialize)]
pub struct TaskFile {
    pub service_name: String,
    pub version_name: String,
    #[serde(default)]
    pub version_code: i64,
    #[serde(default)]
    pub variant: String,
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub build_id_file: Option<PathBuf>,
    /// Site name, e.g. `CN`.
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub remote_repository_url: Option<String>,
    #[serde(default)]
    pub ci_config_file: Option<PathBuf>,
    #[serde(default)]
    pub source_roots: Vec<PathBuf>,
    #[serde(default)]
    pub repository_file: Option<PathBuf>,
    #[serde(default)]
    pub disable_gzip: bool,
    #[serde(default)]
    pub files: Vec<ArtifactToUpload>,
}

/// A parsed task file and the directory its relative paths are based on.
#[derive(Debug)]
pub struct LoadedTask {
    pub task: TaskFile,
    pub base_dir: PathBuf,
}

/// Flags given on the command line.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub disable_gzip: bool,
    pub emulate_network_call: bool,
}

/// Values read from the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvironmentInputs {
    pub api_key: Option<String>,
    pub site: Option<String>,
}

impl EnvironmentInputs {
    pub fn from_process() -> Self {
        Self {
            api_key: ApiKey::from_environment(),
            site: config::site_from_environment(),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LoadedTask> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading task file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read task file");
        anyhow::anyhow!("Failed to read task file {:?}: {}", path_ref, e)
    })?;

    let task: TaskFile = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse task file");
        anyhow::anyhow!("Failed to parse task file YAML: {e}")
    })?;

    let base_dir = path_ref
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    info!(
        config_path = ?path_ref,
        files = task.files.len(),
        source_roots = task.source_roots.len(),
        "Task file loaded"
    );
    Ok(LoadedTask { task, base_dir })
}

impl LoadedTask {
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn build_id(&self) -> Result<String> {
        if let Some(build_id) = self.task.build_id.as_deref().filter(|b| !b.is_empty()) {
            return Ok(build_id.to_string());
        }
        match &self.task.build_id_file {
            Some(file) => {
                let file = self.resolve_path(file);
                let content = fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read build id file {}", file.display()))?;
                Ok(content.trim().to_string())
            }
            None => Ok(String::new()),
        }
    }

    /// Declared artifacts with their paths resolved.
    pub fn artifacts(&self) -> Vec<ArtifactToUpload> {
        self.task
            .files
            .iter()
            .map(|artifact| ArtifactToUpload::new(artifact.kind, self.resolve_path(&artifact.file)))
            .collect()
    }

    pub fn to_task_config(
        &self,
        overrides: &CliOverrides,
        environment: &EnvironmentInputs,
    ) -> Result<UploadTaskConfig> {
        let task = &self.task;
        let api_key = ApiKey::resolve(
            overrides.api_key.as_deref(),
            task.api_key.as_deref(),
            environment.api_key.as_deref(),
        );

        let ci_config_file = match &task.ci_config_file {
            Some(path) => Some(self.resolve_path(path)),
            None => config::find_ci_config_file(&self.base_dir),
        };

        let repository_file = task
            .repository_file
            .as_deref()
            .map(|p| self.resolve_path(p))
            .unwrap_or_else(|| self.base_dir.join(DEFAULT_REPOSITORY_FILE));

        Ok(UploadTaskConfig {
            api_key,
            site: task.site.clone(),
            environment_site: environment.site.clone(),
            ci_config_file,
            app: AppIdentity {
                service_name: task.service_name.clone(),
                version_name: task.version_name.clone(),
                version_code: task.version_code,
                variant: task.variant.clone(),
                build_id: self.build_id()?,
            },
            source_roots: task
                .source_roots
                .iter()
                .map(|root| self.resolve_path(root))
                .collect(),
            remote_repository_url: task.remote_repository_url.clone(),
            repository_file,
            gzip_enabled: !(task.disable_gzip || overrides.disable_gzip),
            emulate_network_call: overrides.emulate_network_call,
        })
    }
}
