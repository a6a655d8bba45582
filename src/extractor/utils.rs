//! Shared helpers for extractor modules: query strings and filenames.

use std::collections::BTreeMap;

use url::Url;

/// Parses a URL query string into a map.
///
/// `+` decodes to a space, percent-escapes are decoded, pairs with an empty
/// value are dropped and the first occurrence of a key wins. Pairs are
/// separated by `&` only, so `;` stays part of a value.
#[must_use]
pub fn parse_query(query: &str) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = decode_component(key);
        let value = decode_component(value);
        if key.is_empty() || value.is_empty() {
            continue;
        }
        result.entry(key).or_insert(value);
    }
    result
}

fn decode_component(value: &str) -> String {
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced).map_or(spaced.clone(), |decoded| decoded.into_owned())
}

/// Parses an optional integer, falling back to `default` on absence or garbage.
#[must_use]
pub fn parse_int(value: Option<&str>, default: u64) -> u64 {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

/// Splits the last path segment of `url` into `(filename, extension)`.
///
/// The filename excludes the extension; both are empty when the URL has no
/// usable last segment. Extensions are lowercased.
#[must_use]
pub fn nameext_from_url(url: &str) -> (String, String) {
    let segment = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_else(|| {
            let without_query = url.split(['?', '#']).next().unwrap_or_default();
            without_query.rsplit('/').next().unwrap_or_default().to_string()
        });
    let segment = urlencoding::decode(&segment).map_or(segment.clone(), |d| d.into_owned());

    match segment.rsplit_once('.') {
        Some((name, ext)) if !name.is_empty() && !ext.is_empty() && ext.len() <= 16 => {
            (name.to_string(), ext.to_ascii_lowercase())
        }
        _ => (segment, String::new()),
    }
}
