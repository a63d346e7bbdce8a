use std::fs;

use tracing::{info, warn};

use crate::contract::{ArtifactProvider, ArtifactToUpload};

/// Artifacts declared up front, e.g. in the task file.
///
/// Declared files that are missing or empty are skipped with a warning rather
/// than failing the upload.
#[derive(Debug, Clone, Default)]
pub struct FileArtifacts {
    declared: Vec<ArtifactToUpload>,
}

impl FileArtifacts {
    pub fn new(declared: Vec<ArtifactToUpload>) -> Self {
        Self { declared }
    }
}

impl ArtifactProvider for FileArtifacts {
    fn files(&self) -> Vec<ArtifactToUpload> {
        self.declared
            .iter()
            .filter(|artifact| match fs::metadata(&artifact.file) {
                Ok(meta) if meta.is_file() && meta.len() > 0 => true,
                Ok(_) => {
                    warn!(file = %artifact.file.display(), kind = ?artifact.kind, "File is empty or not a regular file, skipping it");
                    false
                }
                Err(e) => {
                    info!(file = %artifact.file.display(), kind = ?artifact.kind, error = %e, "File not found, skipping it");
                    false
                }
            })
            .cloned()
            .collect()
    }
}
