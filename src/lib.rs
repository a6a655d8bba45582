//! Gallery extraction core library
//!
//! Turns URLs of media-hosting sites into a uniform, pull-based stream of
//! typed messages (`Directory`, `Url`, `Queue`, `Metadata`) for a downstream
//! downloader.
//!
//! # Architecture
//!
//! - [`extractor`] - Pattern registry, extractor trait, pagination engine, site adapters
//! - [`message`] - The message protocol shared by every extractor
//! - [`cache`] - Durable TTL-bounded session token cache (SQLite)
//! - [`transport`] - HTTP boundary and its reqwest implementation
//! - [`config`] - Resolved options and credentials handed to extractors
//! - [`job`] - Stream consumer with queue recursion and per-URL failure reporting

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod extractor;
pub mod job;
pub mod message;
pub mod transport;
mod user_agent;

// Re-export commonly used types
pub use cache::{CacheError, CacheKey, SessionCache};
pub use config::{Credentials, ExtractorConfig};
pub use extractor::{
    Extractor, ExtractError, ExtractorContext, ExtractorInfo, ExtractorRegistry, MessageStream,
    RegistryError, default_registry,
};
pub use job::{Job, JobFailure, JobOptions, JobReport};
pub use message::{Message, MessageKind, Metadata};
pub use transport::{
    HttpRequest, HttpResponse, ReqwestTransport, RequestInterval, RetryPolicy, Transport,
    TransportError, TransportOptions,
};
