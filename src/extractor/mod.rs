//! Site extractors and the machinery they share.
//!
//! A URL is matched by the [`ExtractorRegistry`] to one [`ExtractorInfo`];
//! its constructor binds the capture groups into an [`Extractor`] instance,
//! which is then pulled one [`Message`] at a time through a [`MessageStream`].
//!
//! # Architecture
//!
//! - [`Extractor`] - Async trait each site variant implements
//! - [`ExtractorInfo`] - Static registration record (pattern, example, category, format hints)
//! - [`ExtractorRegistry`] - Ordered pattern table, first match wins
//! - [`Paginator`] - Listing pagination state machine
//! - [`MessageStream`] - Pull-based message cursor over one extractor
//! - [`koharu`] - Reference site: galleries, search results, favorites
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use extractor_core::extractor::{ExtractorContext, default_registry};
//! use extractor_core::transport::ReqwestTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = default_registry();
//! let ctx = ExtractorContext::new(Arc::new(ReqwestTransport::new()?));
//! let mut stream = registry.build("https://koharu.to/g/12345/67890abcde/", ctx)?;
//! while let Some(message) = stream.next().await? {
//!     println!("{:?} {:?}", message.kind(), message.url());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
pub mod koharu;
mod pagination;
mod registry;
mod utils;

pub use error::{ExtractError, RegistryError};
pub use pagination::{Cursor, PageState, Paginator, termination_reached};
pub use registry::{ExtractorMatch, ExtractorRegistry};
pub use utils::{nameext_from_url, parse_int, parse_query};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::SessionCache;
use crate::config::ExtractorConfig;
use crate::message::{Message, Metadata};
use crate::transport::{HttpRequest, Transport};

/// Builds the registry with every built-in extractor.
///
/// Order is deterministic; a built-in that fails registration is logged and
/// skipped so the remaining sites stay usable.
#[must_use]
pub fn default_registry() -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();
    for &info in koharu::EXTRACTORS {
        if let Err(error) = registry.register(info) {
            warn!(error = %error, extractor = info.id, "built-in extractor unavailable");
        }
    }
    registry
}

/// Result category tuple `(site-group, site, content-kind)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Category {
    /// Family of sites sharing one engine.
    pub group: &'static str,
    /// Site name.
    pub site: &'static str,
    /// Kind of content this variant extracts.
    pub kind: &'static str,
}

/// Constructor stored in an [`ExtractorInfo`].
pub type BuildFn = fn(ExtractorMatch, ExtractorContext) -> Box<dyn Extractor>;

/// Static registration record of one extractor variant.
pub struct ExtractorInfo {
    /// Unique id, `"<site>:<kind>"`. Carried as `_extractor` in `Queue` messages.
    pub id: &'static str,
    /// Result category.
    pub category: Category,
    /// URL pattern; matched against the whole URL.
    pub pattern: &'static str,
    /// Example URL used for self-tests and shadowing checks.
    pub example: &'static str,
    /// Directory naming hint, passed downstream unevaluated.
    pub directory_fmt: &'static [&'static str],
    /// Filename naming hint.
    pub filename_fmt: &'static str,
    /// Download-archive key hint.
    pub archive_fmt: &'static str,
    /// Minimum `(min, max)` seconds between requests to the site.
    pub request_interval: Option<(f64, f64)>,
    /// Instantiates the extractor for a match.
    pub build: BuildFn,
}

impl PartialEq for ExtractorInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ExtractorInfo {}

impl fmt::Debug for ExtractorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorInfo")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("pattern", &self.pattern)
            .field("example", &self.example)
            .finish_non_exhaustive()
    }
}

/// Dependencies injected into every extractor instance.
#[derive(Clone)]
pub struct ExtractorContext {
    /// HTTP capability.
    pub transport: Arc<dyn Transport>,
    /// Session cache; without one, logins are not reused.
    pub cache: Option<SessionCache>,
    /// Resolved options.
    pub config: ExtractorConfig,
}

impl ExtractorContext {
    /// Creates a context with default configuration and no cache.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: None,
            config: ExtractorConfig::default(),
        }
    }

    /// Attaches a session cache.
    #[must_use]
    pub fn with_cache(mut self, cache: SessionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }
}

impl fmt::Debug for ExtractorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorContext")
            .field("cache", &self.cache.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One site variant bound to one URL.
///
/// Implementations are small state machines: each call to
/// [`next_message`](Extractor::next_message) issues at most the requests
/// needed to produce that one message, so a consumer that stops early never
/// pays for work it did not pull. After an `Err`, the failed step has not
/// advanced any state; pulling again retries it.
#[async_trait]
pub trait Extractor: Send {
    /// Returns the registration record.
    fn info(&self) -> &'static ExtractorInfo;

    /// Returns the URL this instance was built for.
    fn url(&self) -> &str;

    /// Returns the directory naming hint for this instance.
    fn directory_fmt(&self) -> &'static [&'static str] {
        self.info().directory_fmt
    }

    /// Returns the filename naming hint for this instance.
    fn filename_fmt(&self) -> &'static str {
        self.info().filename_fmt
    }

    /// Resolves the record describing the extracted entity.
    async fn metadata(&mut self) -> Result<Metadata, ExtractError>;

    /// Produces the next message; `Ok(None)` marks the end of the stream.
    async fn next_message(&mut self) -> Result<Option<Message>, ExtractError>;
}

/// Pull-based cursor over one extractor's messages.
///
/// Not resumable: restarting means building a fresh extractor.
pub struct MessageStream {
    extractor: Box<dyn Extractor>,
    yielded: usize,
    finished: bool,
}

impl MessageStream {
    /// Wraps an extractor.
    #[must_use]
    pub fn new(extractor: Box<dyn Extractor>) -> Self {
        Self {
            extractor,
            yielded: 0,
            finished: false,
        }
    }

    /// Returns the extractor driving the stream.
    #[must_use]
    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }

    /// Returns the registration record of the extractor.
    #[must_use]
    pub fn info(&self) -> &'static ExtractorInfo {
        self.extractor.info()
    }

    /// Number of messages yielded so far.
    #[must_use]
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Pulls the next message.
    ///
    /// Once the stream has ended, further calls return `Ok(None)` without
    /// touching the network.
    ///
    /// # Errors
    ///
    /// Returns the extractor's [`ExtractError`].
    pub async fn next(&mut self) -> Result<Option<Message>, ExtractError> {
        if self.finished {
            return Ok(None);
        }
        match self.extractor.next_message().await? {
            Some(message) => {
                self.yielded += 1;
                Ok(Some(message))
            }
            None => {
                debug!(
                    extractor = self.extractor.info().id,
                    messages = self.yielded,
                    "stream exhausted"
                );
                self.finished = true;
                Ok(None)
            }
        }
    }

    /// Pulls every remaining message.
    ///
    /// # Errors
    ///
    /// Returns the first [`ExtractError`].
    pub async fn collect_all(mut self) -> Result<Vec<Message>, ExtractError> {
        let mut messages = Vec::new();
        while let Some(message) = self.next().await? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// Pulls at most `limit` messages, then stops without further requests.
    ///
    /// # Errors
    ///
    /// Returns the first [`ExtractError`].
    pub async fn take(&mut self, limit: usize) -> Result<Vec<Message>, ExtractError> {
        let mut messages = Vec::with_capacity(limit.min(64));
        while messages.len() < limit {
            match self.next().await? {
                Some(message) => messages.push(message),
                None => break,
            }
        }
        Ok(messages)
    }
}

impl fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStream")
            .field("extractor", &self.extractor.info().id)
            .field("url", &self.extractor.url())
            .field("yielded", &self.yielded)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Sends `request` and decodes a successful JSON body.
///
/// Non-success statuses map through [`ExtractError::from_status`] with
/// `resource` naming what was being fetched.
pub(crate) async fn request_json(
    transport: &dyn Transport,
    category: &str,
    resource: &str,
    request: HttpRequest,
) -> Result<Value, ExtractError> {
    let url = request.url.clone();
    let response = transport
        .request(request)
        .await
        .map_err(|source| ExtractError::transport(category, source))?;

    if !response.is_success() {
        return Err(ExtractError::from_status(
            category,
            resource,
            &url,
            response.status,
        ));
    }

    response
        .json::<Value>()
        .map_err(|e| ExtractError::parse(category, &url, e))
}

/// Converts a header map into a JSON object (for `_http_headers`).
pub(crate) fn headers_value(headers: &BTreeMap<String, String>) -> Value {
    Value::Object(
        headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::test_support::ScriptedTransport;
    use super::*;
    use crate::transport::TransportError;

    #[tokio::test]
    async fn test_request_json_maps_status_and_body() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"ok": true}));
        transport.push_json(404, json!({}));
        transport.push_json(403, json!({}));

        let ok = request_json(&transport, "koharu", "gallery", HttpRequest::get("https://a/1"))
            .await
            .unwrap();
        assert_eq!(ok["ok"], true);

        let missing =
            request_json(&transport, "koharu", "gallery", HttpRequest::get("https://a/2")).await;
        assert!(matches!(missing, Err(ExtractError::NotFound { ref resource, .. }) if resource == "gallery"));

        let denied =
            request_json(&transport, "koharu", "gallery", HttpRequest::get("https://a/3")).await;
        assert!(matches!(denied, Err(ExtractError::Authorization { status: 403, .. })));
    }

    #[tokio::test]
    async fn test_request_json_wraps_transport_failure() {
        let transport = ScriptedTransport::new();
        transport.push_error(TransportError::Timeout {
            url: "https://a/1".to_string(),
        });
        let result =
            request_json(&transport, "koharu", "gallery", HttpRequest::get("https://a/1")).await;
        assert!(matches!(result, Err(ExtractError::Transport { .. })));
    }

    #[test]
    fn test_default_registry_registers_builtins() {
        let registry = default_registry();
        assert_eq!(registry.len(), koharu::EXTRACTORS.len());
    }
}
