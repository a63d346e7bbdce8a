//! Catalog of the Flashcat sites mapping files can be uploaded to.
//!
//! The catalog is fixed at compile time. Sites are identified by their declared
//! name (`CN`, `STAGING`); environment variables and the CI config file refer
//! to them by intake hostname instead, so both lookups are provided.

use std::fmt;

use serde::Serialize;

/// A Flashcat deployment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FlashcatSite {
    /// The CN site: <https://browser.flashcat.cloud>.
    #[serde(rename = "CN")]
    Cn,
    /// The STAGING site (internal usage only): <https://jira.flashcat.cloud>.
    #[serde(rename = "STAGING")]
    Staging,
}

/// All endpoints derived from a site's intake hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteEndpoints {
    pub intake: String,
    pub upload: String,
    pub api_key_verification: String,
}

impl FlashcatSite {
    /// The catalog, in declaration order. The first entry is the default site.
    pub const ALL: [FlashcatSite; 2] = [FlashcatSite::Cn, FlashcatSite::Staging];

    /// Declared name, as accepted in the `site` configuration field.
    pub fn name(self) -> &'static str {
        match self {
            FlashcatSite::Cn => "CN",
            FlashcatSite::Staging => "STAGING",
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            FlashcatSite::Cn => "cn",
            FlashcatSite::Staging => "staging",
        }
    }

    pub fn intake_host_name(self) -> &'static str {
        match self {
            FlashcatSite::Cn => "browser.flashcat.cloud",
            FlashcatSite::Staging => "jira.flashcat.cloud",
        }
    }

    pub fn intake_endpoint(self) -> String {
        format!("https://{}", self.intake_host_name())
    }

    /// Endpoint mapping files are posted to.
    pub fn upload_endpoint(self) -> String {
        format!(
            "https://sourcemap-intake.{}/api/v2/srcmap",
            self.intake_host_name()
        )
    }

    /// Endpoint used to check that an API key is accepted by this site.
    pub fn api_key_verification_endpoint(self) -> String {
        format!("https://api.{}/api/v1/validate", self.intake_host_name())
    }

    pub fn endpoints(self) -> SiteEndpoints {
        SiteEndpoints {
            intake: self.intake_endpoint(),
            upload: self.upload_endpoint(),
            api_key_verification: self.api_key_verification_endpoint(),
        }
    }

    /// Returns the site whose intake hostname is exactly `host_name`.
    pub fn from_host_name(host_name: &str) -> Option<FlashcatSite> {
        Self::ALL
            .into_iter()
            .find(|site| site.intake_host_name() == host_name)
    }

    /// Returns the site declared as `name` (case-sensitive).
    pub fn from_name(name: &str) -> Option<FlashcatSite> {
        Self::ALL.into_iter().find(|site| site.name() == name)
    }

    pub fn is_valid_name(name: &str) -> bool {
        Self::from_name(name).is_some()
    }

    pub fn valid_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|site| site.name()).collect()
    }
}

impl Default for FlashcatSite {
    fn default() -> Self {
        Self::ALL[0]
    }
}

impl fmt::Display for FlashcatSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
