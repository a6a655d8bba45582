//! The uniform output protocol of every extractor.
//!
//! An extraction yields an ordered sequence of [`Message`]s. `Directory` and
//! `Metadata` messages always precede the `Url` / `Queue` messages they
//! annotate, so a consumer can keep a running context while pulling.

use serde::Serialize;
use serde_json::{Map, Value};

/// Key-value data attached to a message.
pub type Metadata = Map<String, Value>;

/// Discriminant of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    /// Sets the output grouping context.
    Directory,
    /// A directly downloadable location.
    Url,
    /// A URL to resolve again through the registry.
    Queue,
    /// Contextual data without a download.
    Metadata,
}

/// One unit of the output protocol.
///
/// Serializes as `{"kind": ..., "url": ..., "metadata": {...}}`; `Queue`
/// additionally carries `_extractor`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Message {
    /// Sets the output grouping context for following `Url` messages.
    Directory {
        /// Grouping metadata.
        metadata: Metadata,
    },
    /// A resolved, downloadable location.
    Url {
        /// Download URL.
        url: String,
        /// Per-file metadata.
        metadata: Metadata,
    },
    /// A URL to recurse into.
    Queue {
        /// URL handled by `extractor`.
        url: String,
        /// Data already known about the target, so non-recursing consumers
        /// need no second fetch.
        metadata: Metadata,
        /// Id of the extractor variant that handles `url`.
        #[serde(rename = "_extractor")]
        extractor: &'static str,
    },
    /// Attaches or updates context without a download.
    Metadata {
        /// Context data.
        metadata: Metadata,
    },
}

impl Message {
    /// Returns the message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Directory { .. } => MessageKind::Directory,
            Self::Url { .. } => MessageKind::Url,
            Self::Queue { .. } => MessageKind::Queue,
            Self::Metadata { .. } => MessageKind::Metadata,
        }
    }

    /// Returns the URL payload of `Url` and `Queue` messages.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Url { url, .. } | Self::Queue { url, .. } => Some(url),
            Self::Directory { .. } | Self::Metadata { .. } => None,
        }
    }

    /// Returns the attached metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::Directory { metadata }
            | Self::Url { metadata, .. }
            | Self::Queue { metadata, .. }
            | Self::Metadata { metadata } => metadata,
        }
    }

    /// Returns the target extractor id of a `Queue` message.
    #[must_use]
    pub fn queued_extractor(&self) -> Option<&'static str> {
        match self {
            Self::Queue { extractor, .. } => Some(extractor),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn meta(value: Value) -> Metadata {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_queue_serializes_extractor_marker() {
        let message = Message::Queue {
            url: "https://koharu.to/g/1/abc".to_string(),
            metadata: meta(json!({"id": 1})),
            extractor: "koharu:gallery",
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["kind"], "Queue");
        assert_eq!(value["_extractor"], "koharu:gallery");
        assert_eq!(value["url"], "https://koharu.to/g/1/abc");
        assert_eq!(value["metadata"]["id"], 1);
    }

    #[test]
    fn test_accessors() {
        let directory = Message::Directory {
            metadata: meta(json!({"title": "t"})),
        };
        assert_eq!(directory.kind(), MessageKind::Directory);
        assert!(directory.url().is_none());
        assert_eq!(directory.metadata()["title"], "t");
        assert!(directory.queued_extractor().is_none());

        let url = Message::Url {
            url: "https://cdn.example/1.webp".to_string(),
            metadata: Metadata::new(),
        };
        assert_eq!(url.kind(), MessageKind::Url);
        assert_eq!(url.url(), Some("https://cdn.example/1.webp"));
    }
}
