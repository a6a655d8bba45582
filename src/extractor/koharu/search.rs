use std::sync::Arc;

use async_trait::async_trait;

use crate::extractor::{
    Category, ExtractError, Extractor, ExtractorContext, ExtractorInfo, ExtractorMatch,
};
use crate::message::{Message, Metadata};
use crate::transport::Transport;

use super::{CATEGORY, Listing, REQUEST_INTERVAL, Site};

/// Search result variant.
pub static SEARCH: ExtractorInfo = ExtractorInfo {
    id: "koharu:search",
    category: Category {
        group: CATEGORY,
        site: CATEGORY,
        kind: "search",
    },
    pattern: concat!(base_pattern!(), r"/\?([^#]*)(?:#.*)?"),
    example: "https://koharu.to/?s=QUERY",
    directory_fmt: &["{category}", "{subcategory}"],
    filename_fmt: "{filename}.{extension}",
    archive_fmt: "{id}",
    request_interval: Some(REQUEST_INTERVAL),
    build: SearchExtractor::build,
};

/// Walks `/books` search results, queueing each gallery.
pub struct SearchExtractor {
    found: ExtractorMatch,
    transport: Arc<dyn Transport>,
    listing: Listing,
    announced: bool,
}

impl SearchExtractor {
    /// Binds a matched URL to a search extractor.
    #[must_use]
    pub fn new(found: ExtractorMatch, ctx: ExtractorContext) -> Self {
        let site = Site::from_config(&ctx.config);
        let listing = Listing::new(site, SEARCH.category.kind, "/books", found.group(1));
        Self {
            found,
            transport: ctx.transport,
            listing,
            announced: false,
        }
    }

    fn build(found: ExtractorMatch, ctx: ExtractorContext) -> Box<dyn Extractor> {
        Box::new(Self::new(found, ctx))
    }
}

#[async_trait]
impl Extractor for SearchExtractor {
    fn info(&self) -> &'static ExtractorInfo {
        &SEARCH
    }

    fn url(&self) -> &str {
        self.found.url()
    }

    async fn metadata(&mut self) -> Result<Metadata, ExtractError> {
        Ok(self.listing.metadata())
    }

    async fn next_message(&mut self) -> Result<Option<Message>, ExtractError> {
        if !self.announced {
            self.announced = true;
            return Ok(Some(Message::Metadata {
                metadata: self.listing.metadata(),
            }));
        }
        self.listing.next_queue(self.transport.as_ref()).await
    }
}
