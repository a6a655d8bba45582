//! Already-resolved configuration handed to extractors.
//!
//! The core never reads configuration files. The binary (or any other
//! caller) builds an [`ExtractorConfig`] from its own sources and passes it in
//! through [`crate::extractor::ExtractorContext`].

use std::collections::BTreeMap;
use std::fmt;

/// Username/password pair for sites that need a login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name; also the identity sessions are cached under.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Builds credentials from optional parts; a blank username yields `None`.
    #[must_use]
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        let username = username?.trim().to_string();
        if username.is_empty() {
            return None;
        }
        Some(Self::new(username, password.unwrap_or_default()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-invocation extractor options.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Requested download format id; `None` or `"original"` selects the original.
    pub format: Option<String>,
    /// Whether to request packaged archives (CBZ) instead of single images.
    pub archive: bool,
    /// Login credentials, when configured.
    pub credentials: Option<Credentials>,
    /// Endpoint overrides by name (`root`, `api`, `auth`), mainly for tests and mirrors.
    pub endpoints: BTreeMap<String, String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            format: None,
            archive: true,
            credentials: None,
            endpoints: BTreeMap::new(),
        }
    }
}

impl ExtractorConfig {
    /// Sets the requested format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Sets archive mode.
    #[must_use]
    pub fn with_archive(mut self, archive: bool) -> Self {
        self.archive = archive;
        self
    }

    /// Sets credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Overrides one endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(name.into(), url.into());
        self
    }

    /// Returns the override for `name`, or `default`, without a trailing slash.
    #[must_use]
    pub fn endpoint(&self, name: &str, default: &str) -> String {
        self.endpoints
            .get(name)
            .map_or(default, String::as_str)
            .trim_end_matches('/')
            .to_string()
    }
}
