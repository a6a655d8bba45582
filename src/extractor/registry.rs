//! Ordered URL pattern table.
//!
//! Patterns are tried in registration order and the first full match wins.
//! Overlaps are caught when a variant registers: its example URL must not
//! already be claimed by an earlier pattern, unless it asks for precedence
//! and is placed ahead of the pattern that would shadow it.

use regex::Regex;
use tracing::debug;

use super::{ExtractError, ExtractorContext, ExtractorInfo, MessageStream, RegistryError};

/// A URL bound to the variant that matched it, with its capture groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorMatch {
    info: &'static ExtractorInfo,
    url: String,
    groups: Vec<Option<String>>,
}

impl ExtractorMatch {
    /// Matched variant.
    #[must_use]
    pub fn info(&self) -> &'static ExtractorInfo {
        self.info
    }

    /// The matched URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// All capture groups in order; groups that did not participate are `None`.
    #[must_use]
    pub fn groups(&self) -> &[Option<String>] {
        &self.groups
    }

    /// Capture group `index`, 1-based as in regex syntax.
    #[must_use]
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups
            .get(index.checked_sub(1)?)
            .and_then(Option::as_deref)
    }
}

struct Entry {
    info: &'static ExtractorInfo,
    regex: Regex,
}

impl Entry {
    fn compile(info: &'static ExtractorInfo) -> Result<Self, RegistryError> {
        let regex = Regex::new(&format!("^(?:{})$", info.pattern)).map_err(|e| {
            RegistryError::InvalidPattern {
                id: info.id.to_string(),
                reason: e.to_string(),
            }
        })?;
        if !regex.is_match(info.example) {
            return Err(RegistryError::ExampleMismatch {
                id: info.id.to_string(),
                example: info.example.to_string(),
            });
        }
        Ok(Self { info, regex })
    }

    fn capture(&self, url: &str) -> Option<ExtractorMatch> {
        let captures = self.regex.captures(url)?;
        let groups = captures
            .iter()
            .skip(1)
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect();
        Some(ExtractorMatch {
            info: self.info,
            url: url.to_string(),
            groups,
        })
    }
}

/// Registered extractor variants in match order.
pub struct ExtractorRegistry {
    entries: Vec<Entry>,
}

impl ExtractorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a variant.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the id is taken, the pattern does not
    /// compile, the example does not match its own pattern, or an earlier
    /// pattern already matches the example.
    #[tracing::instrument(skip(self, info), fields(extractor = info.id))]
    pub fn register(&mut self, info: &'static ExtractorInfo) -> Result<(), RegistryError> {
        self.ensure_unique(info)?;
        let entry = Entry::compile(info)?;
        if let Some(earlier) = self.first_matching(info.example) {
            return Err(RegistryError::PatternShadowed {
                id: info.id.to_string(),
                by: earlier.info.id.to_string(),
            });
        }
        debug!(pattern = info.pattern, position = self.entries.len(), "Registering extractor");
        self.entries.push(entry);
        Ok(())
    }

    /// Registers a variant ahead of the first pattern that would shadow it.
    ///
    /// Without any shadowing pattern this behaves like [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// As [`register`](Self::register), except that shadowing of the new
    /// example is resolved; fails with `PatternShadowed` if the new pattern
    /// would in turn capture the example of a variant placed after it.
    #[tracing::instrument(skip(self, info), fields(extractor = info.id))]
    pub fn register_with_precedence(
        &mut self,
        info: &'static ExtractorInfo,
    ) -> Result<(), RegistryError> {
        self.ensure_unique(info)?;
        let entry = Entry::compile(info)?;
        let position = self
            .entries
            .iter()
            .position(|e| e.regex.is_match(info.example))
            .unwrap_or(self.entries.len());

        if let Some(victim) = self.entries[position..]
            .iter()
            .find(|e| entry.regex.is_match(e.info.example))
        {
            return Err(RegistryError::PatternShadowed {
                id: victim.info.id.to_string(),
                by: info.id.to_string(),
            });
        }

        debug!(pattern = info.pattern, position, "Registering extractor with precedence");
        self.entries.insert(position, entry);
        Ok(())
    }

    /// Number of registered variants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered variants in match order.
    pub fn infos(&self) -> impl Iterator<Item = &'static ExtractorInfo> + '_ {
        self.entries.iter().map(|e| e.info)
    }

    /// Looks up a variant by id.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&'static ExtractorInfo> {
        self.entries.iter().find(|e| e.info.id == id).map(|e| e.info)
    }

    /// Matches `url` against every pattern in order.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::NoMatch`] when no pattern matches.
    #[tracing::instrument(skip(self))]
    pub fn resolve(&self, url: &str) -> Result<ExtractorMatch, ExtractError> {
        let url = url.trim();
        let found = self
            .entries
            .iter()
            .find_map(|entry| entry.capture(url))
            .ok_or_else(|| ExtractError::no_match(url))?;
        debug!(extractor = found.info.id, groups = ?found.groups, "Resolved URL");
        Ok(found)
    }

    /// Matches `url` against the named variant only.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::NoMatch`] when the id is unknown or its
    /// pattern does not match.
    #[tracing::instrument(skip(self))]
    pub fn resolve_with(&self, id: &str, url: &str) -> Result<ExtractorMatch, ExtractError> {
        let url = url.trim();
        let Some(entry) = self.entries.iter().find(|e| e.info.id == id) else {
            debug!(extractor = id, "Unknown extractor id");
            return Err(ExtractError::no_match(url));
        };
        entry.capture(url).ok_or_else(|| ExtractError::no_match(url))
    }

    /// Instantiates the matched variant.
    #[must_use]
    pub fn instantiate(found: ExtractorMatch, ctx: ExtractorContext) -> MessageStream {
        let build = found.info.build;
        MessageStream::new(build(found, ctx))
    }

    /// Resolves `url` and instantiates the matching variant.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::NoMatch`] when no pattern matches.
    pub fn build(&self, url: &str, ctx: ExtractorContext) -> Result<MessageStream, ExtractError> {
        Ok(Self::instantiate(self.resolve(url)?, ctx))
    }

    /// Resolves `url` through the named variant and instantiates it.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::NoMatch`] when the id is unknown or does not match.
    pub fn build_with(
        &self,
        id: &str,
        url: &str,
        ctx: ExtractorContext,
    ) -> Result<MessageStream, ExtractError> {
        Ok(Self::instantiate(self.resolve_with(id, url)?, ctx))
    }

    fn ensure_unique(&self, info: &ExtractorInfo) -> Result<(), RegistryError> {
        if self.find(info.id).is_some() {
            return Err(RegistryError::Duplicate {
                id: info.id.to_string(),
            });
        }
        Ok(())
    }

    fn first_matching(&self, url: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.regex.is_match(url))
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.entries.iter().map(|e| e.info.id).collect();
        f.debug_struct("ExtractorRegistry")
            .field("extractor_count", &self.entries.len())
            .field("extractors", &ids)
            .finish()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::extractor::test_support::ScriptedTransport;
    use crate::extractor::{Category, Extractor, default_registry};
    use crate::message::{Message, Metadata};

    struct Echo {
        found: ExtractorMatch,
        done: bool,
    }

    #[async_trait]
    impl Extractor for Echo {
        fn info(&self) -> &'static ExtractorInfo {
            self.found.info()
        }

        fn url(&self) -> &str {
            self.found.url()
        }

        async fn metadata(&mut self) -> Result<Metadata, ExtractError> {
            Ok(Metadata::new())
        }

        async fn next_message(&mut self) -> Result<Option<Message>, ExtractError> {
            if self.done {
                return Ok(None);
            }
            self.done = true;
            Ok(Some(Message::Url {
                url: self.found.url().to_string(),
                metadata: Metadata::new(),
            }))
        }
    }

    fn echo(found: ExtractorMatch, _ctx: ExtractorContext) -> Box<dyn Extractor> {
        Box::new(Echo { found, done: false })
    }

    const fn info(id: &'static str, pattern: &'static str, example: &'static str) -> ExtractorInfo {
        ExtractorInfo {
            id,
            category: Category {
                group: "test",
                site: "test",
                kind: "item",
            },
            pattern,
            example,
            directory_fmt: &["{category}"],
            filename_fmt: "{filename}.{extension}",
            archive_fmt: "{id}",
            request_interval: None,
            build: echo,
        }
    }

    static BROAD: ExtractorInfo = info("site:broad", r"https?://site\.test/.*", "https://site.test/any");
    static NARROW: ExtractorInfo = info(
        "site:narrow",
        r"https?://site\.test/item/(\d+)",
        "https://site.test/item/7",
    );
    static OTHER: ExtractorInfo = info("other:page", r"https?://other\.test/(\w+)", "https://other.test/abc");
    static BAD_PATTERN: ExtractorInfo = info("bad:pattern", r"https?://bad\.test/(", "https://bad.test/");
    static BAD_EXAMPLE: ExtractorInfo = info("bad:example", r"https?://bad\.test/x", "https://bad.test/y");
    static GREEDY: ExtractorInfo = info("site:greedy", r"https?://site\.test/(?:item/)?.*", "https://site.test/item/");
    static OPTIONAL: ExtractorInfo = info(
        "opt:groups",
        r"https?://opt\.test/(\w+)(?:/(\d+))?",
        "https://opt.test/a",
    );

    fn ctx() -> ExtractorContext {
        ExtractorContext::new(Arc::new(ScriptedTransport::new()))
    }

    #[test]
    fn test_builtin_examples_resolve_to_own_variant() {
        let registry = default_registry();
        assert!(!registry.is_empty());
        for info in registry.infos() {
            let found = registry.resolve(info.example).unwrap();
            assert_eq!(found.info().id, info.id, "example {}", info.example);
        }
    }

    #[test]
    fn test_resolve_is_anchored_and_first_match_wins() {
        let mut registry = ExtractorRegistry::new();
        registry.register(&NARROW).unwrap();
        registry.register(&OTHER).unwrap();

        let found = registry.resolve("https://site.test/item/42").unwrap();
        assert_eq!(found.info().id, "site:narrow");
        assert_eq!(found.group(1), Some("42"));
        assert_eq!(found.group(0), None);
        assert_eq!(found.group(2), None);

        let err = registry.resolve("https://site.test/item/42/extra").unwrap_err();
        assert!(matches!(err, ExtractError::NoMatch { .. }));
        let err = registry.resolve("prefix https://other.test/abc").unwrap_err();
        assert!(matches!(err, ExtractError::NoMatch { .. }));
    }

    #[test]
    fn test_unmatched_optional_group_is_none() {
        let mut registry = ExtractorRegistry::new();
        registry.register(&OPTIONAL).unwrap();
        let found = registry.resolve("https://opt.test/a").unwrap();
        assert_eq!(found.groups(), &[Some("a".to_string()), None]);
    }

    #[test]
    fn test_register_rejects_shadowed_variant() {
        let mut registry = ExtractorRegistry::new();
        registry.register(&BROAD).unwrap();
        let err = registry.register(&NARROW).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::PatternShadowed { ref id, ref by } if id == "site:narrow" && by == "site:broad"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_with_precedence_inserts_before_shadowing_pattern() {
        let mut registry = ExtractorRegistry::new();
        registry.register(&OTHER).unwrap();
        registry.register(&BROAD).unwrap();
        registry.register_with_precedence(&NARROW).unwrap();

        let order: Vec<&str> = registry.infos().map(|i| i.id).collect();
        assert_eq!(order, ["other:page", "site:narrow", "site:broad"]);
        assert_eq!(registry.resolve("https://site.test/item/1").unwrap().info().id, "site:narrow");
        assert_eq!(registry.resolve("https://site.test/about").unwrap().info().id, "site:broad");
    }

    #[test]
    fn test_register_with_precedence_refuses_to_shadow_later_examples() {
        let mut registry = ExtractorRegistry::new();
        registry.register(&BROAD).unwrap();
        let err = registry.register_with_precedence(&GREEDY).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::PatternShadowed { ref id, ref by } if id == "site:broad" && by == "site:greedy"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_validates_info() {
        let mut registry = ExtractorRegistry::new();
        assert!(matches!(
            registry.register(&BAD_PATTERN),
            Err(RegistryError::InvalidPattern { .. })
        ));
        assert!(matches!(
            registry.register(&BAD_EXAMPLE),
            Err(RegistryError::ExampleMismatch { .. })
        ));
        registry.register(&OTHER).unwrap();
        assert!(matches!(
            registry.register(&OTHER),
            Err(RegistryError::Duplicate { .. })
        ));
        assert!(registry.find("other:page").is_some());
        assert!(registry.find("bad:pattern").is_none());
    }

    #[test]
    fn test_resolve_with_targets_one_variant() {
        let mut registry = ExtractorRegistry::new();
        registry.register(&OTHER).unwrap();
        registry.register(&BROAD).unwrap();

        let found = registry.resolve_with("other:page", "https://other.test/xyz").unwrap();
        assert_eq!(found.group(1), Some("xyz"));
        assert!(registry.resolve_with("other:page", "https://site.test/a").is_err());
        assert!(registry.resolve_with("missing:id", "https://other.test/xyz").is_err());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let registry = default_registry();
        let url = "https://koharu.to/g/12345/67890abcde/";
        let first = registry.resolve(url).unwrap();
        let second = registry.resolve(url).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_build_instantiates_matched_variant() {
        let mut registry = ExtractorRegistry::new();
        registry.register(&OTHER).unwrap();

        let mut stream = registry.build("  https://other.test/abc ", ctx()).unwrap();
        assert_eq!(stream.info().id, "other:page");
        let message = stream.next().await.unwrap().unwrap();
        assert_eq!(message.url(), Some("https://other.test/abc"));
        assert!(stream.next().await.unwrap().is_none());

        let stream = registry.build_with("other:page", "https://other.test/q", ctx()).unwrap();
        assert_eq!(stream.extractor().url(), "https://other.test/q");
        assert!(registry.build("https://nowhere.test/", ctx()).is_err());
    }

    #[test]
    fn test_debug_lists_ids() {
        let mut registry = ExtractorRegistry::new();
        registry.register(&OTHER).unwrap();
        let debug = format!("{registry:?}");
        assert!(debug.contains("other:page"));
    }
}
