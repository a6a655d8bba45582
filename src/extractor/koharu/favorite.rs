use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument};

use crate::cache::{CacheKey, SessionCache};
use crate::config::Credentials;
use crate::extractor::{
    Category, ExtractError, Extractor, ExtractorContext, ExtractorInfo, ExtractorMatch,
};
use crate::message::{Message, Metadata};
use crate::transport::{HttpRequest, Transport};

use super::{CATEGORY, Listing, REQUEST_INTERVAL, Site};

/// Favorites variant.
pub static FAVORITE: ExtractorInfo = ExtractorInfo {
    id: "koharu:favorite",
    category: Category {
        group: CATEGORY,
        site: CATEGORY,
        kind: "favorite",
    },
    pattern: concat!(base_pattern!(), r"/favorites/?(?:\?([^#]*))?(?:#.*)?"),
    example: "https://koharu.to/favorites",
    directory_fmt: &["{category}", "{subcategory}"],
    filename_fmt: "{filename}.{extension}",
    archive_fmt: "{id}",
    request_interval: Some(REQUEST_INTERVAL),
    build: FavoriteExtractor::build,
};

/// How long a login session is reused.
pub const SESSION_MAX_AGE: Duration = Duration::from_secs(28 * 86_400);

/// Walks the logged-in account's favorites, queueing each gallery.
///
/// The first pull logs in (reusing a cached session when one is still
/// valid) and fails with `AuthenticationRequired` before any request when no
/// credentials are configured.
pub struct FavoriteExtractor {
    found: ExtractorMatch,
    transport: Arc<dyn Transport>,
    cache: Option<SessionCache>,
    credentials: Option<Credentials>,
    listing: Listing,
    logged_in: bool,
    announced: bool,
}

impl FavoriteExtractor {
    /// Binds a matched URL to a favorites extractor.
    #[must_use]
    pub fn new(found: ExtractorMatch, ctx: ExtractorContext) -> Self {
        let site = Site::from_config(&ctx.config);
        let listing = Listing::new(site, FAVORITE.category.kind, "/favorites", found.group(1));
        Self {
            found,
            transport: ctx.transport,
            cache: ctx.cache,
            credentials: ctx.config.credentials,
            listing,
            logged_in: false,
            announced: false,
        }
    }

    fn build(found: ExtractorMatch, ctx: ExtractorContext) -> Box<dyn Extractor> {
        Box::new(Self::new(found, ctx))
    }

    async fn login(&mut self) -> Result<(), ExtractError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            ExtractError::auth_required(CATEGORY, "favorites need a logged-in account")
        })?;
        let site = &self.listing.site;
        let transport = self.transport.as_ref();

        let token = match &self.cache {
            Some(cache) => {
                let key = CacheKey::new(CATEGORY, &credentials.username);
                cache
                    .get_or_create(&key, SESSION_MAX_AGE, || {
                        request_session(transport, &site.auth, &site.headers, credentials)
                    })
                    .await?
            }
            None => request_session(transport, &site.auth, &site.headers, credentials).await?,
        };

        self.listing
            .site
            .headers
            .insert("Authorization".to_string(), format!("Bearer {token}"));
        Ok(())
    }
}

/// Posts the credentials to the login endpoint and returns the session token.
#[instrument(skip(transport, headers, credentials), fields(username = %credentials.username))]
async fn request_session(
    transport: &dyn Transport,
    auth_url: &str,
    headers: &BTreeMap<String, String>,
    credentials: &Credentials,
) -> Result<String, ExtractError> {
    info!("Logging in as {}", credentials.username);
    let failed = |reason: String| ExtractError::auth_failed(CATEGORY, &credentials.username, &reason);

    let request = HttpRequest::post(auth_url)
        .headers(headers.clone())
        .form_field("uname", &credentials.username)
        .form_field("passwd", &credentials.password);
    let response = transport
        .request(request)
        .await
        .map_err(|e| failed(e.to_string()))?;

    if !response.is_success() {
        return Err(failed(format!("HTTP {}", response.status)));
    }

    let body: Value = response
        .json()
        .map_err(|e| failed(format!("unreadable login response: {e}")))?;
    body.get("session")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| failed("login response carried no session token".to_string()))
}

#[async_trait]
impl Extractor for FavoriteExtractor {
    fn info(&self) -> &'static ExtractorInfo {
        &FAVORITE
    }

    fn url(&self) -> &str {
        self.found.url()
    }

    async fn metadata(&mut self) -> Result<Metadata, ExtractError> {
        Ok(self.listing.metadata())
    }

    async fn next_message(&mut self) -> Result<Option<Message>, ExtractError> {
        if !self.logged_in {
            self.login().await?;
            self.logged_in = true;
        }
        if !self.announced {
            self.announced = true;
            return Ok(Some(Message::Metadata {
                metadata: self.listing.metadata(),
            }));
        }
        self.listing.next_queue(self.transport.as_ref()).await
    }
}
