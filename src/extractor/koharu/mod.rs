//! Extractors for koharu.to and its anchira.to mirror.
//!
//! - [`GalleryExtractor`] - one gallery, as an archive or as single images
//! - [`SearchExtractor`] - search result listing
//! - [`FavoriteExtractor`] - the logged-in account's favorites
//!
//! Listings emit `Queue` messages pointing back at [`GALLERY`].

macro_rules! base_pattern {
    () => {
        r"(?i)(?:https?://)?(?:koharu|anchira)\.to"
    };
}

mod favorite;
mod gallery;
mod search;

pub use favorite::{FAVORITE, FavoriteExtractor, SESSION_MAX_AGE};
pub use gallery::{GALLERY, GalleryExtractor, TAG_TYPES};
pub use search::{SEARCH, SearchExtractor};

use std::collections::{BTreeMap, VecDeque};

use serde_json::{Map, Value};
use tracing::warn;

use crate::config::ExtractorConfig;
use crate::message::{Message, Metadata};
use crate::transport::Transport;

use super::{Cursor, ExtractError, ExtractorInfo, Paginator, parse_int, parse_query};

/// Site category.
pub const CATEGORY: &str = "koharu";
/// Default web root.
pub const ROOT: &str = "https://koharu.to";
/// Default API root.
pub const API_ROOT: &str = "https://api.koharu.to";
/// Default login endpoint.
pub const AUTH_URL: &str = "https://auth.koharu.to/login";

const REQUEST_INTERVAL: (f64, f64) = (0.5, 1.5);

/// All koharu variants in registration order.
pub static EXTRACTORS: &[&ExtractorInfo] = &[&GALLERY, &SEARCH, &FAVORITE];

/// Endpoints and request headers shared by one extractor instance.
#[derive(Debug, Clone)]
struct Site {
    api: String,
    auth: String,
    headers: BTreeMap<String, String>,
}

impl Site {
    fn from_config(config: &ExtractorConfig) -> Self {
        let root = config.endpoint("root", ROOT);
        let headers = BTreeMap::from([
            ("Accept".to_string(), "*/*".to_string()),
            ("Referer".to_string(), format!("{root}/")),
            ("Origin".to_string(), root),
        ]);
        Self {
            api: config.endpoint("api", API_ROOT),
            auth: config.endpoint("auth", AUTH_URL),
            headers,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api)
    }

    /// Canonical gallery URL. The `root` override only affects request
    /// headers, so queued URLs always match [`GALLERY`].
    fn gallery_url(id: &str, key: &str) -> String {
        format!("{ROOT}/g/{id}/{key}")
    }
}

/// Renders a JSON scalar used inside a URL path or query.
fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A paginated listing turned into `Queue` messages.
#[derive(Debug)]
struct Listing {
    site: Site,
    subcategory: &'static str,
    params: BTreeMap<String, String>,
    paginator: Paginator,
    pending: VecDeque<Value>,
}

impl Listing {
    fn new(site: Site, subcategory: &'static str, endpoint: &str, query: Option<&str>) -> Self {
        let mut params = query.map(parse_query).unwrap_or_default();
        let page = parse_int(params.remove("page").as_deref(), 1);
        let paginator = Paginator::new(
            CATEGORY,
            site.api_url(endpoint),
            params.clone(),
            Cursor::page("page", page),
        );
        Self {
            site,
            subcategory,
            params,
            paginator,
            pending: VecDeque::new(),
        }
    }

    fn metadata(&self) -> Metadata {
        let search: Map<String, Value> = self
            .params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let mut metadata = Metadata::new();
        metadata.insert("category".into(), CATEGORY.into());
        metadata.insert("subcategory".into(), self.subcategory.into());
        metadata.insert("search".into(), Value::Object(search));
        metadata.insert("page".into(), self.paginator.cursor().value().into());
        metadata
    }

    /// Returns the next valid entry as a `Queue` message, fetching pages as needed.
    async fn next_queue(
        &mut self,
        transport: &dyn Transport,
    ) -> Result<Option<Message>, ExtractError> {
        loop {
            while let Some(entry) = self.pending.pop_front() {
                if let Some(message) = self.queue_message(entry) {
                    return Ok(Some(message));
                }
            }
            match self.paginator.next_page(transport, &self.site.headers).await? {
                Some(page) => self.pending.extend(page),
                None => return Ok(None),
            }
        }
    }

    fn queue_message(&self, entry: Value) -> Option<Message> {
        let Value::Object(metadata) = entry else {
            warn!(category = CATEGORY, "skipping listing entry that is not an object");
            return None;
        };
        let (Some(id), Some(key)) = (
            scalar(metadata.get("id")),
            scalar(metadata.get("public_key")),
        ) else {
            warn!(
                category = CATEGORY,
                entry = ?metadata.get("id"),
                "skipping listing entry without id/public_key"
            );
            return None;
        };
        Some(Message::Queue {
            url: Site::gallery_url(&id, &key),
            metadata,
            extractor: GALLERY.id,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::extractor::test_support::ScriptedTransport;

    fn listing(query: Option<&str>) -> Listing {
        Listing::new(Site::from_config(&ExtractorConfig::default()), "search", "/books", query)
    }

    #[test]
    fn test_site_defaults_and_overrides() {
        let site = Site::from_config(&ExtractorConfig::default());
        assert_eq!(site.api_url("/books"), "https://api.koharu.to/books");
        assert_eq!(site.headers["Referer"], "https://koharu.to/");
        assert_eq!(site.headers["Origin"], "https://koharu.to");
        assert_eq!(site.headers["Accept"], "*/*");

        let config = ExtractorConfig::default()
            .with_endpoint("root", "http://127.0.0.1:1/")
            .with_endpoint("api", "http://127.0.0.1:2");
        let site = Site::from_config(&config);
        assert_eq!(site.headers["Origin"], "http://127.0.0.1:1");
        assert_eq!(Site::gallery_url("1", "ab"), "https://koharu.to/g/1/ab");
        assert_eq!(site.api_url("/favorites"), "http://127.0.0.1:2/favorites");
        assert_eq!(site.auth, AUTH_URL);
    }

    #[test]
    fn test_listing_page_parameter() {
        assert_eq!(listing(Some("s=cat&page=3")).paginator.cursor().value(), 3);
        assert_eq!(listing(Some("s=cat&page=x")).paginator.cursor().value(), 1);
        assert_eq!(listing(None).paginator.cursor().value(), 1);

        let metadata = listing(Some("s=big+cat&page=2")).metadata();
        assert_eq!(metadata["subcategory"], "search");
        assert_eq!(metadata["search"]["s"], "big cat");
        assert_eq!(metadata["page"], 2);
    }

    #[tokio::test]
    async fn test_listing_skips_malformed_entries() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            200,
            json!({
                "entries": [
                    {"id": 1, "public_key": "aa", "title": "one"},
                    {"id": 2, "title": "no key"},
                    "garbage",
                    {"id": "3", "public_key": "cc"}
                ],
                "limit": 4, "page": 1, "total": 4
            }),
        );

        let mut listing = listing(Some("s=x"));
        let mut urls = Vec::new();
        while let Some(message) = listing.next_queue(&transport).await.unwrap() {
            assert_eq!(message.queued_extractor(), Some("koharu:gallery"));
            urls.push(message.url().unwrap().to_string());
        }
        assert_eq!(urls, ["https://koharu.to/g/1/aa", "https://koharu.to/g/3/cc"]);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_listing_carries_entry_fields() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"entries": [{"id": 9, "public_key": "k", "title": "t"}]}));
        transport.push_json(200, json!({}));

        let mut listing = listing(None);
        let message = listing.next_queue(&transport).await.unwrap().unwrap();
        assert_eq!(message.metadata()["title"], "t");
        assert!(listing.next_queue(&transport).await.unwrap().is_none());
        assert_eq!(transport.request_count(), 2);
        assert_eq!(transport.requests()[0].headers["Origin"], "https://koharu.to");
    }

    #[tokio::test]
    async fn test_queued_urls_stay_canonical_with_root_override() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            200,
            json!({"entries": [{"id": 5, "public_key": "k5"}], "limit": 25, "page": 1, "total": 1}),
        );

        let config = ExtractorConfig::default().with_endpoint("root", "http://127.0.0.1:1");
        let mut listing = Listing::new(Site::from_config(&config), "search", "/books", None);
        let message = listing.next_queue(&transport).await.unwrap().unwrap();
        let url = message.url().unwrap();
        assert_eq!(url, "https://koharu.to/g/5/k5");

        let found = crate::extractor::default_registry()
            .resolve_with(GALLERY.id, url)
            .unwrap();
        assert_eq!(found.group(1), Some("5"));
        assert_eq!(found.group(2), Some("k5"));
        assert_eq!(transport.requests()[0].headers["Referer"], "http://127.0.0.1:1/");
    }

    #[test]
    fn test_scalar() {
        assert_eq!(scalar(Some(&json!(12))), Some("12".to_string()));
        assert_eq!(scalar(Some(&json!("ab"))), Some("ab".to_string()));
        assert_eq!(scalar(Some(&json!(""))), None);
        assert_eq!(scalar(Some(&json!(null))), None);
        assert_eq!(scalar(None), None);
    }
}
