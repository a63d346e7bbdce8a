//! Layered resolution of the API key and target site.
//!
//! Values come from four places, highest precedence first:
//!
//! 1. explicit configuration (`--api-key`, or the `api_key` / `site` fields of the task file);
//! 2. the `flashcat-ci.json` CI context file;
//! 3. the environment (`FLASHCAT_SITE` for the site, `FC_API_KEY` / `FLASHCAT_API_KEY` for the key);
//! 4. the default site, [`FlashcatSite::default`].
//!
//! A lower source never replaces a value set by a higher one, regardless of the
//! order in which the sources are applied. The environment API key is folded in
//! by [`ApiKey::resolve`] before resolution starts, with [`ApiKeySource::Environment`],
//! so the CI file may still replace it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::ConfigurationError;
use crate::site::FlashcatSite;

pub const FLASHCAT_SITE_ENV: &str = "FLASHCAT_SITE";
pub const API_KEY_ENV_VARS: [&str; 2] = ["FC_API_KEY", "FLASHCAT_API_KEY"];
pub const CI_CONFIG_FILE_NAME: &str = "flashcat-ci.json";

const CI_API_KEY_PROPERTY: &str = "apiKey";
const CI_SITE_PROPERTY: &str = "flashcatSite";
const CI_FILE_MAX_PARENT_LEVELS: usize = 3;

/// Where the API key in use came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiKeySource {
    #[default]
    None,
    Environment,
    ExtensionConfig,
    GradleProperty,
    CiConfigFile,
}

impl ApiKeySource {
    fn outranks_ci_config_file(self) -> bool {
        matches!(
            self,
            ApiKeySource::ExtensionConfig | ApiKeySource::GradleProperty
        )
    }
}

#[derive(Clone, PartialEq, Eq, Default)]
pub struct ApiKey {
    pub value: String,
    pub source: ApiKeySource,
}

impl ApiKey {
    pub fn new(value: impl Into<String>, source: ApiKeySource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    /// Picks the first non-blank of the explicit inputs.
    ///
    /// `gradle_property` is the command-line override, `extension` the task file
    /// value, `environment` whatever [`ApiKey::from_environment`] found.
    pub fn resolve(
        gradle_property: Option<&str>,
        extension: Option<&str>,
        environment: Option<&str>,
    ) -> ApiKey {
        let candidates = [
            (gradle_property, ApiKeySource::GradleProperty),
            (extension, ApiKeySource::ExtensionConfig),
            (environment, ApiKeySource::Environment),
        ];
        candidates
            .into_iter()
            .find_map(|(value, source)| {
                value
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| ApiKey::new(v, source))
            })
            .unwrap_or_default()
    }

    /// Reads the first set API key variable from the process environment.
    pub fn from_environment() -> Option<String> {
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.trim().is_empty())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Reads the site hostname from `FLASHCAT_SITE`.
pub fn site_from_environment() -> Option<String> {
    std::env::var(FLASHCAT_SITE_ENV)
        .ok()
        .filter(|value| !value.is_empty())
}

/// Contents of a `flashcat-ci.json` file. Blank or non-string fields are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiConfig {
    pub api_key: Option<String>,
    pub site_host_name: Option<String>,
}

impl CiConfig {
    pub fn from_json_str(content: &str) -> Result<CiConfig, serde_json::Error> {
        let object: Map<String, Value> = serde_json::from_str(content)?;
        let string_field = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.trim().is_empty())
                .map(str::to_owned)
        };
        Ok(CiConfig {
            api_key: string_field(CI_API_KEY_PROPERTY),
            site_host_name: string_field(CI_SITE_PROPERTY),
        })
    }

    /// Loads the file, treating any read or parse failure as "no file".
    pub fn load(path: &Path) -> Option<CiConfig> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!(error = %e, path = %path.display(), "Failed to read Flashcat CI config file.");
                return None;
            }
        };
        match CiConfig::from_json_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                error!(error = %e, path = %path.display(), "Failed to parse Flashcat CI config file.");
                None
            }
        }
    }
}

/// Looks for `flashcat-ci.json` in `start_dir` and up to three of its parents.
/// A relative `start_dir` is taken from the current directory.
pub fn find_ci_config_file(start_dir: &Path) -> Option<PathBuf> {
    let start_dir = fs::canonicalize(start_dir).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(start_dir))
            .unwrap_or_else(|_| start_dir.to_path_buf())
    });
    start_dir
        .ancestors()
        .take(CI_FILE_MAX_PARENT_LEVELS + 1)
        .map(|dir| dir.join(CI_CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Everything the resolver consumes.
#[derive(Debug, Clone, Copy)]
pub struct ResolverInput<'a> {
    pub api_key: &'a ApiKey,
    /// Explicit site name, e.g. `"CN"`.
    pub site: Option<&'a str>,
    /// Hostname read from `FLASHCAT_SITE`.
    pub environment_site: Option<&'a str>,
    pub ci_config_file: Option<&'a Path>,
    pub build_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub api_key: ApiKey,
    pub site: FlashcatSite,
}

/// Working copy of the key and site while sources are being applied.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    api_key: ApiKey,
    site: Option<String>,
}

impl ConfigResolver {
    pub fn new(api_key: ApiKey, site: Option<&str>) -> Self {
        Self {
            api_key,
            site: site.filter(|s| !s.trim().is_empty()).map(str::to_owned),
        }
    }

    pub fn apply_ci_config(&mut self, config: &CiConfig) {
        if let Some(api_key) = &config.api_key {
            self.apply_api_key_from_ci_config(api_key);
        }
        if let Some(host_name) = &config.site_host_name {
            self.apply_site_host_name(host_name, "Flashcat CI config file");
        }
    }

    pub fn apply_site_from_environment(&mut self, host_name: &str) {
        if host_name.is_empty() {
            return;
        }
        self.apply_site_host_name(host_name, "FLASHCAT_SITE env variable");
    }

    fn apply_api_key_from_ci_config(&mut self, api_key: &str) {
        if self.api_key.source.outranks_ci_config_file() {
            info!(
                source = ?self.api_key.source,
                "API key found in Flashcat CI config file, but it will be ignored, because also an explicit one was provided."
            );
            return;
        }
        info!("API key found in Flashcat CI config file, using it.");
        self.api_key = ApiKey::new(api_key, ApiKeySource::CiConfigFile);
    }

    fn apply_site_host_name(&mut self, host_name: &str, origin: &str) {
        if let Some(current) = &self.site {
            info!(
                origin,
                site = %current,
                "Site property found, but it will be ignored, because a higher precedence one was already provided."
            );
            return;
        }
        match FlashcatSite::from_host_name(host_name) {
            Some(site) => {
                info!(origin, site = %site, "Site property found, using it.");
                self.site = Some(site.name().to_owned());
            }
            None => {
                warn!(origin, host_name, "Unknown Flashcat hostname provided, ignoring it.");
            }
        }
    }

    /// Final checks. Nothing is uploaded unless this succeeds.
    pub fn validate(self, build_id: &str) -> Result<ResolvedConfig, ConfigurationError> {
        if self.api_key.value.trim().is_empty() {
            return Err(ConfigurationError::MissingApiKey);
        }

        let site = match self.site.as_deref() {
            None => {
                let site = FlashcatSite::default();
                debug!(site = %site, "No site configured, using the default one");
                site
            }
            Some(name) => {
                FlashcatSite::from_name(name).ok_or_else(|| ConfigurationError::InvalidSite {
                    site: name.to_owned(),
                    valid: FlashcatSite::valid_names(),
                })?
            }
        };

        if self.api_key.value.contains('"') || self.api_key.value.contains('\'') {
            return Err(ConfigurationError::InvalidApiKeyFormat);
        }

        if build_id.trim().is_empty() {
            return Err(ConfigurationError::MissingBuildId);
        }

        Ok(ResolvedConfig {
            api_key: self.api_key,
            site,
        })
    }
}

/// Runs the whole resolution: CI file, then environment, then validation.
pub fn resolve(input: ResolverInput<'_>) -> Result<ResolvedConfig, ConfigurationError> {
    let mut resolver = ConfigResolver::new(input.api_key.clone(), input.site);

    if let Some(path) = input.ci_config_file {
        if let Some(ci_config) = CiConfig::load(path) {
            resolver.apply_ci_config(&ci_config);
        }
    }
    if let Some(host_name) = input.environment_site {
        resolver.apply_site_from_environment(host_name);
    }

    resolver.validate(input.build_id)
}
