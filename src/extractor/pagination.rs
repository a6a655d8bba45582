//! Listing pagination state machine.
//!
//! ```text
//! Requesting ──ok──▶ Parsing ──listing key absent──▶ Exhausted
//!     │                 │
//!     │                 ├──limit * page >= total──▶ Exhausted (after yielding the page)
//!     │                 └──otherwise──▶ Continue (cursor += 1 unit)
//!     └──error──▶ Failed (returned to caller, cursor untouched)
//! ```
//!
//! Upstreams report totals inconsistently, so termination is checked two
//! ways: the `(limit, page, total)` triple when present and well-formed, and
//! otherwise a structurally absent listing key on the following request. The
//! engine never guesses from page size and never retries on its own.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::transport::{HttpRequest, Transport};

use super::{ExtractError, request_json};

/// Default key holding the entries of a listing response.
pub const DEFAULT_LISTING_KEY: &str = "entries";

/// Position in a paginated listing, sent as one query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    param: String,
    value: u64,
    step: u64,
}

impl Cursor {
    /// Page-number cursor advancing by one page.
    #[must_use]
    pub fn page(param: impl Into<String>, start: u64) -> Self {
        Self {
            param: param.into(),
            value: start,
            step: 1,
        }
    }

    /// Offset cursor advancing by `step` items (one page worth).
    #[must_use]
    pub fn offset(param: impl Into<String>, start: u64, step: u64) -> Self {
        Self {
            param: param.into(),
            value: start,
            step: step.max(1),
        }
    }

    /// Query parameter name.
    #[must_use]
    pub fn param(&self) -> &str {
        &self.param
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value
    }

    fn advance(&mut self) {
        self.value = self.value.saturating_add(self.step);
    }
}

/// Whether more pages may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Another request will be issued on the next pull.
    Continue,
    /// Upstream signalled the end; no further requests.
    Exhausted,
}

/// Drives one paginated listing endpoint.
#[derive(Debug)]
pub struct Paginator {
    category: &'static str,
    url: String,
    params: BTreeMap<String, String>,
    cursor: Cursor,
    listing_key: String,
    state: PageState,
    requests: usize,
}

impl Paginator {
    /// Creates a paginator for `url`; `params` are sent with every request
    /// alongside the cursor parameter.
    #[must_use]
    pub fn new(
        category: &'static str,
        url: impl Into<String>,
        mut params: BTreeMap<String, String>,
        cursor: Cursor,
    ) -> Self {
        params.remove(cursor.param());
        Self {
            category,
            url: url.into(),
            params,
            cursor,
            listing_key: DEFAULT_LISTING_KEY.to_string(),
            state: PageState::Continue,
            requests: 0,
        }
    }

    /// Uses a different key for the listing array.
    #[must_use]
    pub fn with_listing_key(mut self, key: impl Into<String>) -> Self {
        self.listing_key = key.into();
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PageState {
        self.state
    }

    /// True once no further requests will be made.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state == PageState::Exhausted
    }

    /// Current cursor.
    #[must_use]
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Number of successful requests issued so far.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Fetches the next page.
    ///
    /// Returns `Ok(None)` once exhausted (without a request when already
    /// known). On error nothing is mutated, so calling again re-requests the
    /// same cursor value.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] for transport, status or JSON failures.
    #[instrument(skip(self, transport, headers), fields(category = self.category, url = %self.url, cursor = self.cursor.value()))]
    pub async fn next_page(
        &mut self,
        transport: &dyn Transport,
        headers: &BTreeMap<String, String>,
    ) -> Result<Option<Vec<Value>>, ExtractError> {
        if self.is_exhausted() {
            return Ok(None);
        }

        let mut params = self.params.clone();
        params.insert(self.cursor.param().to_string(), self.cursor.value().to_string());
        let request = HttpRequest::get(&self.url)
            .params(params)
            .headers(headers.clone());

        let data = request_json(transport, self.category, "page", request).await?;
        self.requests += 1;

        let Some(Value::Array(entries)) = data.get(&self.listing_key) else {
            debug!(requests = self.requests, "listing key absent; pagination exhausted");
            self.state = PageState::Exhausted;
            return Ok(None);
        };

        if termination_reached(&data) {
            debug!(
                requests = self.requests,
                entries = entries.len(),
                "total reached; pagination exhausted"
            );
            self.state = PageState::Exhausted;
        } else {
            self.cursor.advance();
        }

        Ok(Some(entries.clone()))
    }
}

/// True when `limit * page >= total` holds for integer fields of `data`.
///
/// A missing or non-integer field yields false, deferring termination to the
/// absent-listing-key rule.
#[must_use]
pub fn termination_reached(data: &Value) -> bool {
    let field = |name: &str| data.get(name).and_then(Value::as_u64);
    match (field("limit"), field("page"), field("total")) {
        (Some(limit), Some(page), Some(total)) => limit.saturating_mul(page) >= total,
        _ => false,
    }
}
