//! Repository metadata for the build: which repository, commit and tracked
//! files the uploaded mapping files were produced from.
//!
//! Detection shells out to `git`. A source root that is missing, or not inside
//! a work tree, contributes nothing; finding no repository at all is normal.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::contract::RepositoryDetector;

pub const REPOSITORY_FILE_VERSION: u32 = 1;

/// One detected repository, in the shape the intake expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryInfo {
    #[serde(rename = "repository_url")]
    pub remote_url: String,
    #[serde(rename = "hash")]
    pub commit_hash: String,
    /// Tracked files below the source roots, relative to the repository root.
    #[serde(rename = "files")]
    pub source_files: Vec<String>,
}

/// Versioned envelope persisted as the repository file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFile {
    pub version: u32,
    pub data: Vec<RepositoryInfo>,
}

impl RepositoryFile {
    pub fn new(repositories: &[RepositoryInfo]) -> Self {
        Self {
            version: REPOSITORY_FILE_VERSION,
            data: repositories.to_vec(),
        }
    }
}

/// Writes the envelope to `path`, creating parent directories.
pub fn write_repository_file(path: &Path, repositories: &[RepositoryInfo]) -> io::Result<()> {
    for repository in repositories {
        info!(
            repository = %to_pretty_json(repository),
            "Detected repository"
        );
    }

    let content = serde_json::to_string(&RepositoryFile::new(repositories))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    debug!(path = %path.display(), "Repository file written");
    Ok(())
}

fn to_pretty_json<T: Serialize>(value: &T) -> String {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8_lossy(&buffer).into_owned(),
        Err(e) => format!("<unserializable: {e}>"),
    }
}

/// Deduplicates roots by canonical absolute path, keeping first-seen order.
///
/// Roots that cannot be canonicalized (usually because they do not exist) are
/// made absolute against the current directory instead.
pub fn unique_source_roots(source_roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    source_roots
        .iter()
        .map(|root| absolute_path(root))
        .filter(|root| seen.insert(root.clone()))
        .collect()
}

fn absolute_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Removes `user:password@` from http(s) remote URLs.
pub fn sanitize_remote_url(url: &str) -> String {
    static CREDENTIALS: OnceLock<Regex> = OnceLock::new();
    let credentials = CREDENTIALS
        .get_or_init(|| Regex::new(r"^(?P<scheme>https?://)[^/@]+@").expect("valid regex"));
    credentials.replace(url.trim(), "${scheme}").into_owned()
}

/// [`RepositoryDetector`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitRepositoryDetector {
    git_binary: PathBuf,
}

impl Default for GitRepositoryDetector {
    fn default() -> Self {
        Self {
            git_binary: PathBuf::from("git"),
        }
    }
}

impl GitRepositoryDetector {
    pub fn new(git_binary: impl Into<PathBuf>) -> Self {
        Self {
            git_binary: git_binary.into(),
        }
    }

    fn git(&self, dir: &Path, args: &[&str]) -> Result<String, String> {
        let output = Command::new(&self.git_binary)
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .map_err(|e| format!("failed to run git: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("git {} failed: {}", args.join(" "), stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn describe(
        &self,
        top_level: &Path,
        roots: &[PathBuf],
        explicit_remote_url: Option<&str>,
    ) -> Option<RepositoryInfo> {
        let remote_url = match explicit_remote_url {
            Some(url) => url.to_owned(),
            None => match self.git(top_level, &["remote", "get-url", "origin"]) {
                Ok(url) if !url.is_empty() => url,
                Ok(_) | Err(_) => {
                    warn!(
                        repository = %top_level.display(),
                        "Repository has no origin remote and no remote_repository_url was configured, skipping it"
                    );
                    return None;
                }
            },
        };

        let commit_hash = match self.git(top_level, &["rev-parse", "HEAD"]) {
            Ok(hash) if !hash.is_empty() => hash,
            Ok(_) | Err(_) => {
                warn!(repository = %top_level.display(), "Unable to read HEAD commit, skipping repository");
                return None;
            }
        };

        let mut source_files = BTreeSet::new();
        for root in roots {
            match self.git(root, &["ls-files", "--full-name"]) {
                Ok(listing) => source_files.extend(
                    listing
                        .lines()
                        .filter(|line| !line.is_empty())
                        .map(str::to_owned),
                ),
                Err(e) => warn!(root = %root.display(), error = %e, "Unable to list tracked files"),
            }
        }

        Some(RepositoryInfo {
            remote_url: sanitize_remote_url(&remote_url),
            commit_hash,
            source_files: source_files.into_iter().collect(),
        })
    }
}

impl RepositoryDetector for GitRepositoryDetector {
    fn detect_repositories<'a>(
        &self,
        source_roots: &[PathBuf],
        explicit_remote_url: Option<&'a str>,
    ) -> Vec<RepositoryInfo> {
        let explicit_remote_url = explicit_remote_url
            .map(str::trim)
            .filter(|url| !url.is_empty());

        let mut roots_by_top_level: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
        for root in unique_source_roots(source_roots) {
            if !root.is_dir() {
                debug!(root = %root.display(), "Source root does not exist, skipping");
                continue;
            }
            match self.git(&root, &["rev-parse", "--show-toplevel"]) {
                Ok(top_level) if !top_level.is_empty() => roots_by_top_level
                    .entry(PathBuf::from(top_level))
                    .or_default()
                    .push(root),
                Ok(_) | Err(_) => {
                    debug!(root = %root.display(), "Source root is not inside a git repository")
                }
            }
        }

        roots_by_top_level
            .iter()
            .filter_map(|(top_level, roots)| self.describe(top_level, roots, explicit_remote_url))
            .collect()
    }
}
