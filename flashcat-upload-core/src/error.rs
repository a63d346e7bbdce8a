use std::path::PathBuf;

/// Error returned by [`crate::contract::Uploader`] implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub const API_KEY_MISSING_ERROR: &str = "Make sure you define an API KEY to upload your mapping files to Flashcat. \
     Create a FC_API_KEY or FLASHCAT_API_KEY environment variable, pass --api-key \
     or define it in flashcat-ci.json file.";
pub const INVALID_API_KEY_FORMAT_ERROR: &str =
    "FC_API_KEY provided shouldn't contain quotes or apostrophes.";
pub const MISSING_BUILD_ID_ERROR: &str =
    "Build ID is missing, you need to run upload task only after APK/AAB file is generated.";

/// Pre-flight failures. None of these ever reach the uploader.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{}", API_KEY_MISSING_ERROR)]
    MissingApiKey,
    #[error("{}", INVALID_API_KEY_FORMAT_ERROR)]
    InvalidApiKeyFormat,
    #[error("You need to provide a valid site (one of {}), got {site:?}", .valid.join(", "))]
    InvalidSite {
        site: String,
        valid: Vec<&'static str>,
    },
    #[error("{}", MISSING_BUILD_ID_ERROR)]
    MissingBuildId,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadTaskError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to write repository file {}: {source}", .path.display())]
    RepositoryFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Exactly one artifact failed; carries the uploader's error unchanged.
    #[error("{0}")]
    Upload(BoxError),

    /// More than one artifact failed; causes are kept in processing order.
    #[error("Multiple errors occurred during upload:{}", list_causes(.0))]
    MultipleUploads(Vec<BoxError>),
}

impl UploadTaskError {
    /// Every per-artifact failure carried by this error, in processing order.
    pub fn upload_failures(&self) -> &[BoxError] {
        match self {
            UploadTaskError::Upload(e) => std::slice::from_ref(e),
            UploadTaskError::MultipleUploads(causes) => causes,
            _ => &[],
        }
    }
}

fn list_causes(causes: &[BoxError]) -> String {
    causes
        .iter()
        .enumerate()
        .map(|(i, e)| format!("\n  {}. {e}", i + 1))
        .collect()
}
