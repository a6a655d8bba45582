//! Error types for extraction.
//!
//! Every failure carries the extractor category and the URL or resource it
//! concerns, followed by a `Suggestion:` line, so callers can act on it
//! without reading logs.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors that end an extraction (or, for `NoMatch`, prevent one).
///
/// Normal end of a paginated listing is not an error; it is the end of the
/// message stream.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No registered extractor matches the URL.
    #[error("no extractor found for '{url}'\n  Suggestion: Check the URL or list supported sites with --list-extractors")]
    NoMatch {
        /// The unmatched URL.
        url: String,
    },

    /// A sub-resource (format, page, gallery) does not exist upstream.
    #[error("[{category}] requested {resource} not found ({url})\n  Suggestion: {suggestion}")]
    NotFound {
        /// Extractor category.
        category: String,
        /// What was missing, e.g. `format` or `gallery`.
        resource: String,
        /// URL being extracted.
        url: String,
        /// How to fix the issue.
        suggestion: String,
    },

    /// Credentials are needed but none were configured.
    #[error("[{category}] authentication required: {message}\n  Suggestion: Provide --username and --password")]
    AuthenticationRequired {
        /// Extractor category.
        category: String,
        /// What needs authentication.
        message: String,
    },

    /// Upstream rejected the configured credentials.
    #[error("[{category}] login failed for '{username}': {reason}\n  Suggestion: Check the username and password")]
    AuthenticationFailed {
        /// Extractor category.
        category: String,
        /// Account that failed to log in.
        username: String,
        /// Why login failed.
        reason: String,
    },

    /// Upstream denies access to an existing resource.
    #[error("[{category}] access denied (HTTP {status}) for {url}\n  Suggestion: The resource exists but is restricted; log in or check account permissions")]
    Authorization {
        /// Extractor category.
        category: String,
        /// URL that was denied.
        url: String,
        /// HTTP status returned.
        status: u16,
    },

    /// Unexpected non-success status.
    #[error("[{category}] HTTP {status} requesting {url}\n  Suggestion: The site may be down or have changed its API; retry later")]
    HttpStatus {
        /// Extractor category.
        category: String,
        /// URL that failed.
        url: String,
        /// HTTP status returned.
        status: u16,
    },

    /// No response could be obtained.
    #[error("[{category}] {source}")]
    Transport {
        /// Extractor category.
        category: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The response did not have the expected shape.
    #[error("[{category}] unexpected response from {url}: {reason}\n  Suggestion: The site may have changed its API")]
    Parse {
        /// Extractor category.
        category: String,
        /// URL whose response failed to parse.
        url: String,
        /// What was wrong.
        reason: String,
    },
}

impl ExtractError {
    /// Creates a `NoMatch` error.
    #[must_use]
    pub fn no_match(url: &str) -> Self {
        Self::NoMatch {
            url: url.to_string(),
        }
    }

    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(category: &str, resource: &str, url: &str) -> Self {
        let suggestion = if resource == "format" {
            "Choose a format id offered by the item, or 'original'".to_string()
        } else {
            format!("Check that the {resource} still exists")
        };
        Self::NotFound {
            category: category.to_string(),
            resource: resource.to_string(),
            url: url.to_string(),
            suggestion,
        }
    }

    /// Creates an `AuthenticationRequired` error.
    #[must_use]
    pub fn auth_required(category: &str, message: &str) -> Self {
        Self::AuthenticationRequired {
            category: category.to_string(),
            message: message.to_string(),
        }
    }

    /// Creates an `AuthenticationFailed` error.
    #[must_use]
    pub fn auth_failed(category: &str, username: &str, reason: &str) -> Self {
        Self::AuthenticationFailed {
            category: category.to_string(),
            username: username.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `Transport` error.
    #[must_use]
    pub fn transport(category: &str, source: TransportError) -> Self {
        Self::Transport {
            category: category.to_string(),
            source,
        }
    }

    /// Creates a `Parse` error.
    #[must_use]
    pub fn parse(category: &str, url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            category: category.to_string(),
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Maps a final non-success status to the matching error.
    ///
    /// 404/410 → `NotFound(resource)`, 401/403/451 → `Authorization`,
    /// anything else → `HttpStatus`.
    #[must_use]
    pub fn from_status(category: &str, resource: &str, url: &str, status: u16) -> Self {
        match status {
            404 | 410 => Self::not_found(category, resource, url),
            401 | 403 | 451 => Self::Authorization {
                category: category.to_string(),
                url: url.to_string(),
                status,
            },
            _ => Self::HttpStatus {
                category: category.to_string(),
                url: url.to_string(),
                status,
            },
        }
    }

    /// Returns true for failures that abort a batch rather than one URL.
    ///
    /// Only HTTP client construction failures qualify; everything else is
    /// reported per URL.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                source: TransportError::ClientBuild { .. },
                ..
            }
        )
    }
}

/// Errors raised while registering extractors.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The pattern does not compile.
    #[error("invalid pattern for extractor '{id}': {reason}")]
    InvalidPattern {
        /// Extractor id.
        id: String,
        /// Compiler message.
        reason: String,
    },

    /// The declared example URL is not matched by the extractor's own pattern.
    #[error("example URL '{example}' does not match the pattern of extractor '{id}'")]
    ExampleMismatch {
        /// Extractor id.
        id: String,
        /// Declared example URL.
        example: String,
    },

    /// An earlier, broader pattern already matches this extractor's example URL.
    #[error(
        "extractor '{id}' is shadowed by earlier extractor '{by}'\n  Suggestion: Register it with explicit precedence or narrow the earlier pattern"
    )]
    PatternShadowed {
        /// Extractor being registered.
        id: String,
        /// Earlier extractor whose pattern wins.
        by: String,
    },

    /// The same id was registered twice.
    #[error("extractor '{id}' is already registered")]
    Duplicate {
        /// Extractor id.
        id: String,
    },
}
