//! Consumer side of the message protocol.
//!
//! A [`Job`] pulls one URL's [`MessageStream`] to completion, optionally
//! following `Queue` messages into the extractor they name. Failures of a
//! queued child are recorded and the remaining queue entries continue; only
//! errors that make every further extraction pointless abort the run.

use tracing::{debug, info, instrument, warn};

use crate::extractor::{ExtractError, ExtractorContext, ExtractorRegistry, MessageStream};
use crate::message::Message;

/// Default bound on `Queue` recursion depth.
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// How a job consumes its streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Stop after this many items (`Url` messages, plus `Queue` messages that
    /// are not followed).
    pub limit: Option<usize>,
    /// Follow `Queue` messages into their extractor.
    pub recursive: bool,
    /// Maximum recursion depth; deeper `Queue` messages are emitted unfollowed.
    pub max_depth: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            limit: None,
            recursive: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// One URL whose extraction failed.
#[derive(Debug)]
pub struct JobFailure {
    /// URL being extracted.
    pub url: String,
    /// Why it failed.
    pub error: ExtractError,
}

/// Outcome of a job run.
#[derive(Debug, Default)]
pub struct JobReport {
    /// Messages pulled from all streams.
    pub messages: usize,
    /// Items counted against the limit.
    pub items: usize,
    /// Streams opened (root plus followed queue entries).
    pub extractions: usize,
    /// Per-URL failures.
    pub failures: Vec<JobFailure>,
    /// True when the run stopped at the item limit.
    pub limited: bool,
}

impl JobReport {
    /// True if nothing failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: JobReport) {
        self.messages += other.messages;
        self.items += other.items;
        self.extractions += other.extractions;
        self.failures.extend(other.failures);
        self.limited |= other.limited;
    }
}

struct Frame {
    stream: MessageStream,
    depth: usize,
}

/// Runs extractions for URLs against one registry and context.
#[derive(Debug)]
pub struct Job<'a> {
    registry: &'a ExtractorRegistry,
    ctx: ExtractorContext,
    options: JobOptions,
}

impl<'a> Job<'a> {
    /// Creates a job.
    #[must_use]
    pub fn new(registry: &'a ExtractorRegistry, ctx: ExtractorContext, options: JobOptions) -> Self {
        Self {
            registry,
            ctx,
            options,
        }
    }

    /// Extracts `url`, handing every message and its recursion depth to `sink`.
    ///
    /// # Errors
    ///
    /// Returns only errors for which [`ExtractError::is_fatal`] holds; all
    /// others end up in [`JobReport::failures`].
    #[instrument(skip(self, sink), fields(recursive = self.options.recursive))]
    pub async fn run<F>(&self, url: &str, mut sink: F) -> Result<JobReport, ExtractError>
    where
        F: FnMut(usize, &Message),
    {
        let mut report = JobReport::default();
        let root = match self.registry.build(url, self.ctx.clone()) {
            Ok(stream) => stream,
            Err(error) => {
                warn!(url, error = %error, "cannot extract URL");
                report.failures.push(JobFailure {
                    url: url.trim().to_string(),
                    error,
                });
                return Ok(report);
            }
        };
        info!(url, extractor = root.info().id, "Starting extraction");
        report.extractions += 1;

        let mut stack = vec![Frame {
            stream: root,
            depth: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let depth = frame.depth;
            let message = match frame.stream.next().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!(extractor = frame.stream.info().id, depth, "extraction finished");
                    stack.pop();
                    continue;
                }
                Err(error) => {
                    let failed_url = frame.stream.extractor().url().to_string();
                    stack.pop();
                    if error.is_fatal() {
                        return Err(error);
                    }
                    warn!(url = %failed_url, depth, error = %error, "extraction failed");
                    report.failures.push(JobFailure {
                        url: failed_url,
                        error,
                    });
                    continue;
                }
            };

            report.messages += 1;
            sink(depth, &message);

            match &message {
                Message::Queue { url, extractor, .. }
                    if self.options.recursive && depth < self.options.max_depth =>
                {
                    match self.registry.build_with(extractor, url, self.ctx.clone()) {
                        Ok(child) => {
                            report.extractions += 1;
                            stack.push(Frame {
                                stream: child,
                                depth: depth + 1,
                            });
                        }
                        Err(error) => {
                            warn!(url = %url, extractor, error = %error, "cannot follow queued URL");
                            report.failures.push(JobFailure {
                                url: url.clone(),
                                error,
                            });
                        }
                    }
                }
                Message::Url { .. } | Message::Queue { .. } => report.items += 1,
                Message::Directory { .. } | Message::Metadata { .. } => {}
            }

            if self.options.limit.is_some_and(|limit| report.items >= limit) {
                debug!(items = report.items, "item limit reached");
                report.limited = true;
                break;
            }
        }

        info!(
            messages = report.messages,
            items = report.items,
            failures = report.failures.len(),
            "Extraction complete"
        );
        Ok(report)
    }
}
