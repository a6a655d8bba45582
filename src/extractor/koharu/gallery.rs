use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::extractor::{
    Category, ExtractError, Extractor, ExtractorContext, ExtractorInfo, ExtractorMatch,
    headers_value, nameext_from_url, request_json,
};
use crate::message::{Message, Metadata};
use crate::transport::{HttpRequest, Transport};

use super::{CATEGORY, REQUEST_INTERVAL, Site, scalar};

/// Gallery variant.
pub static GALLERY: ExtractorInfo = ExtractorInfo {
    id: "koharu:gallery",
    category: Category {
        group: CATEGORY,
        site: CATEGORY,
        kind: "gallery",
    },
    pattern: concat!(base_pattern!(), r"/(?:g|reader)/(\d+)/(\w+)(?:[/?#].*)?"),
    example: "https://koharu.to/g/12345/67890abcde/",
    directory_fmt: &["{category}", "{id} {title}"],
    filename_fmt: "{num:>03}.{extension}",
    archive_fmt: "{id}_{num}",
    request_interval: Some(REQUEST_INTERVAL),
    build: GalleryExtractor::build,
};

const ARCHIVE_DIRECTORY_FMT: &[&str] = &["{category}"];
const ARCHIVE_FILENAME_FMT: &str = "{id} {title}.{extension}";
const ARCHIVE_EXTENSION: &str = "cbz";
const ORIGINAL_FORMAT: &str = "0";

/// Tag namespace names by numeric namespace id.
pub const TAG_TYPES: [&str; 13] = [
    "general",
    "artist",
    "circle",
    "parody",
    "magazine",
    "character",
    "",
    "uploader",
    "male",
    "female",
    "mixed",
    "language",
    "other",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Directory,
    Files,
    Emitting,
}

/// Extracts one gallery.
///
/// The first pull fetches the gallery record and yields a `Directory`
/// message; the second fetches the download location(s) for the selected
/// format. In archive mode that is a single packaged file.
pub struct GalleryExtractor {
    found: ExtractorMatch,
    transport: Arc<dyn Transport>,
    site: Site,
    format: Option<String>,
    archive: bool,
    data: Option<Metadata>,
    stage: Stage,
    pending: VecDeque<Message>,
}

impl GalleryExtractor {
    /// Binds a matched URL to a gallery extractor.
    #[must_use]
    pub fn new(found: ExtractorMatch, ctx: ExtractorContext) -> Self {
        Self {
            found,
            transport: ctx.transport,
            site: Site::from_config(&ctx.config),
            format: ctx.config.format,
            archive: ctx.config.archive,
            data: None,
            stage: Stage::Directory,
            pending: VecDeque::new(),
        }
    }

    fn build(found: ExtractorMatch, ctx: ExtractorContext) -> Box<dyn Extractor> {
        Box::new(Self::new(found, ctx))
    }

    fn gallery_id(&self) -> &str {
        self.found.group(1).unwrap_or_default()
    }

    fn gallery_key(&self) -> &str {
        self.found.group(2).unwrap_or_default()
    }

    #[instrument(skip(self), fields(id = self.gallery_id()))]
    async fn fetch_metadata(&self) -> Result<Metadata, ExtractError> {
        let url = self.site.api_url(&format!(
            "/books/detail/{}/{}",
            self.gallery_id(),
            self.gallery_key()
        ));
        let request = HttpRequest::get(&url).headers(self.site.headers.clone());
        let data = request_json(self.transport.as_ref(), CATEGORY, "gallery", request).await?;
        let Value::Object(data) = data else {
            return Err(ExtractError::parse(CATEGORY, &url, "gallery record is not an object"));
        };
        Ok(process_metadata(data))
    }

    #[instrument(skip(self, data), fields(id = self.gallery_id(), archive = self.archive))]
    async fn files(&self, data: &Metadata) -> Result<Vec<Message>, ExtractError> {
        let empty = Map::new();
        let formats = data.get("data").and_then(Value::as_object).unwrap_or(&empty);
        let (fid, format) = select_format(formats, self.format.as_deref())
            .ok_or_else(|| ExtractError::not_found(CATEGORY, "format", self.found.url()))?;

        let id = scalar(data.get("id")).unwrap_or_else(|| self.gallery_id().to_string());
        let key = scalar(data.get("public_key")).unwrap_or_else(|| self.gallery_key().to_string());
        let (Some(format_id), Some(format_key)) =
            (scalar(format.get("id")), scalar(format.get("public_key")))
        else {
            return Err(ExtractError::parse(
                CATEGORY,
                self.found.url(),
                format!("format '{fid}' lacks id/public_key"),
            ));
        };
        let version = scalar(data.get("updated_at")).ok_or_else(|| {
            ExtractError::parse(CATEGORY, self.found.url(), "gallery record lacks 'updated_at'")
        })?;
        let url = self
            .site
            .api_url(&format!("/books/data/{id}/{key}/{format_id}/{format_key}"));
        debug!(format = %fid, "selected format");

        if self.archive {
            let request = HttpRequest::post(&url)
                .headers(self.site.headers.clone())
                .param("v", &version)
                .param("w", &fid)
                .param("action", "dl");
            let response = request_json(self.transport.as_ref(), CATEGORY, "archive", request).await?;
            let base = response
                .get("base")
                .and_then(Value::as_str)
                .ok_or_else(|| ExtractError::parse(CATEGORY, &url, "response lacks 'base'"))?;

            let (filename, mut extension) = nameext_from_url(base);
            if extension.is_empty() {
                extension = ARCHIVE_EXTENSION.to_string();
            }
            let mut metadata = data.clone();
            metadata.insert("num".into(), 1.into());
            metadata.insert("count".into(), 1.into());
            metadata.insert("filename".into(), filename.into());
            metadata.insert("extension".into(), extension.into());
            return Ok(vec![Message::Url {
                url: format!("{base}?v={version}&w={fid}"),
                metadata,
            }]);
        }

        let request = HttpRequest::get(&url)
            .headers(self.site.headers.clone())
            .param("v", &version)
            .param("w", &fid);
        let response = request_json(self.transport.as_ref(), CATEGORY, "images", request).await?;
        let base = response
            .get("base")
            .and_then(Value::as_str)
            .ok_or_else(|| ExtractError::parse(CATEGORY, &url, "response lacks 'base'"))?;
        let entries = response
            .get("entries")
            .and_then(Value::as_array)
            .ok_or_else(|| ExtractError::parse(CATEGORY, &url, "response lacks 'entries'"))?;

        let count = entries.len();
        let headers = headers_value(&self.site.headers);
        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let path = entry.get("path").and_then(Value::as_str).ok_or_else(|| {
                    ExtractError::parse(CATEGORY, &url, format!("image {} lacks 'path'", index + 1))
                })?;
                let file_url = format!("{base}{path}");
                let (filename, extension) = nameext_from_url(&file_url);

                let mut metadata = data.clone();
                metadata.insert("num".into(), (index + 1).into());
                metadata.insert("count".into(), count.into());
                if let Some(dimensions) = entry.get("dimensions").and_then(Value::as_array) {
                    metadata.insert("w".into(), dimensions.first().cloned().unwrap_or(Value::Null));
                    metadata.insert("h".into(), dimensions.get(1).cloned().unwrap_or(Value::Null));
                }
                metadata.insert("filename".into(), filename.into());
                metadata.insert("extension".into(), extension.into());
                metadata.insert("_http_headers".into(), headers.clone());
                Ok(Message::Url {
                    url: file_url,
                    metadata,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Extractor for GalleryExtractor {
    fn info(&self) -> &'static ExtractorInfo {
        &GALLERY
    }

    fn url(&self) -> &str {
        self.found.url()
    }

    fn directory_fmt(&self) -> &'static [&'static str] {
        if self.archive {
            ARCHIVE_DIRECTORY_FMT
        } else {
            GALLERY.directory_fmt
        }
    }

    fn filename_fmt(&self) -> &'static str {
        if self.archive {
            ARCHIVE_FILENAME_FMT
        } else {
            GALLERY.filename_fmt
        }
    }

    async fn metadata(&mut self) -> Result<Metadata, ExtractError> {
        if let Some(data) = &self.data {
            return Ok(data.clone());
        }
        let data = self.fetch_metadata().await?;
        self.data = Some(data.clone());
        Ok(data)
    }

    async fn next_message(&mut self) -> Result<Option<Message>, ExtractError> {
        match self.stage {
            Stage::Directory => {
                let metadata = self.metadata().await?;
                self.stage = Stage::Files;
                Ok(Some(Message::Directory { metadata }))
            }
            Stage::Files => {
                let data = self.metadata().await?;
                self.pending = self.files(&data).await?.into();
                self.stage = Stage::Emitting;
                Ok(self.pending.pop_front())
            }
            Stage::Emitting => Ok(self.pending.pop_front()),
        }
    }
}

/// Normalizes a raw gallery record.
///
/// Drops `rels` and `thumbnails`, flattens tags to `"<namespace>:<name>"`,
/// derives `date` from `created_at` (milliseconds) and adds the category.
#[must_use]
pub fn process_metadata(mut data: Metadata) -> Metadata {
    data.remove("rels");
    data.remove("thumbnails");

    let tags: Vec<Value> = data
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(format_tag).map(Value::String).collect())
        .unwrap_or_default();
    data.insert("tags".into(), Value::Array(tags));

    if let Some(date) = data
        .get("created_at")
        .and_then(Value::as_i64)
        .and_then(|ms| DateTime::from_timestamp(ms.div_euclid(1000), 0))
    {
        data.insert(
            "date".into(),
            date.to_rfc3339_opts(SecondsFormat::Secs, true).into(),
        );
    }

    data.insert("category".into(), CATEGORY.into());
    data.insert("subcategory".into(), GALLERY.category.kind.into());
    data
}

fn format_tag(tag: &Value) -> Option<String> {
    let name = tag.get("name").and_then(Value::as_str)?;
    let namespace = tag.get("namespace").and_then(Value::as_u64).unwrap_or(0);
    let prefix = usize::try_from(namespace)
        .ok()
        .and_then(|index| TAG_TYPES.get(index))
        .copied()
        .unwrap_or("other");
    Some(format!("{prefix}:{name}"))
}

/// Picks the requested format record, tagging it with `w = <format id>`.
///
/// `None`, `""` and `"original"` select format `"0"`.
#[must_use]
pub fn select_format(formats: &Map<String, Value>, requested: Option<&str>) -> Option<(String, Metadata)> {
    let fid = match requested {
        None | Some("" | "original") => ORIGINAL_FORMAT,
        Some(other) => other,
    };
    let mut format = formats.get(fid)?.as_object()?.clone();
    format.insert("w".into(), fid.into());
    Some((fid.to_string(), format))
}
