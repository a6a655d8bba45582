//! Default [`Transport`] built on `reqwest`.
//!
//! Centralizes networking defaults so every extractor shares the same timeout,
//! user-agent, compression and proxy policy.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, instrument, warn};

use crate::user_agent;

use super::{
    FailureType, HttpRequest, HttpResponse, RequestInterval, RetryDecision, RetryPolicy, Transport,
    TransportError, classify_error, classify_status, parse_retry_after,
};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// Construction options for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub read_timeout: Duration,
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Optional per-host request pacing.
    pub interval: Option<Arc<RequestInterval>>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            user_agent: user_agent::default_user_agent(),
            retry: RetryPolicy::default(),
            interval: None,
        }
    }
}

/// `reqwest`-backed transport with retry and pacing.
pub struct ReqwestTransport {
    client: Client,
    retry: RetryPolicy,
    interval: Option<Arc<RequestInterval>>,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("retry", &self.retry)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Creates a transport with default options.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] when client construction fails.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_options(TransportOptions::default())
    }

    /// Creates a transport with custom options.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] when client construction fails.
    pub fn with_options(options: TransportOptions) -> Result<Self, TransportError> {
        let client = build_http_client(&options)?;
        Ok(Self {
            client,
            retry: options.retry,
            interval: options.interval,
        })
    }

    /// Sends one attempt; also returns the parsed `Retry-After` header.
    async fn send_once(
        &self,
        request: &HttpRequest,
    ) -> Result<(HttpResponse, Option<Duration>), TransportError> {
        let parsed = url::Url::parse(&request.url).map_err(|_| TransportError::InvalidUrl {
            url: request.url.clone(),
        })?;

        if let Some(interval) = &self.interval {
            interval.acquire(&request.url).await;
        }

        let mut builder = self.client.request(request.method.clone(), parsed);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&request.url, e))?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let body = response
            .bytes()
            .await
            .map_err(|source| TransportError::Body {
                url: request.url.clone(),
                source,
            })?;

        Ok((HttpResponse::new(status, final_url, body.to_vec()), retry_after))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut attempt: u32 = 1;
        loop {
            let failure = match self.send_once(&request).await {
                Ok((response, _)) if response.status < 400 => return Ok(response),
                Ok((response, retry_after)) => {
                    let failure = classify_status(response.status);
                    match self.retry.should_retry(failure, attempt) {
                        RetryDecision::Retry { delay, attempt: next } => {
                            let delay = match retry_after {
                                Some(server) if failure == FailureType::RateLimited => delay.max(server),
                                _ => delay,
                            };
                            debug!(status = response.status, delay_ms = delay.as_millis(), "retrying after status");
                            tokio::time::sleep(delay).await;
                            attempt = next;
                            continue;
                        }
                        // Final non-success responses are handed back for the extractor to interpret.
                        RetryDecision::DoNotRetry { .. } => return Ok(response),
                    }
                }
                Err(error) => error,
            };

            match self.retry.should_retry(classify_error(&failure), attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    warn!(error = %failure, delay_ms = delay.as_millis(), "request failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { .. } => return Err(failure),
            }
        }
    }
}

fn build_http_client(options: &TransportOptions) -> Result<Client, TransportError> {
    match try_build_client(options, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed environments panic when querying system proxy
            // settings; retry with env-only proxy lookup.
            warn!("HTTP client hit system proxy panic; using env-proxy fallback builder");
            match try_build_client(options, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(TransportError::ClientBuild {
                    reason: "client construction panicked while initializing networking"
                        .to_string(),
                }),
                Err(BuildClientFailure::Build(error)) => Err(TransportError::ClientBuild {
                    reason: error.to_string(),
                }),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(TransportError::ClientBuild {
            reason: error.to_string(),
        }),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    options: &TransportOptions,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind(AssertUnwindSafe(|| {
        let mut builder = base_builder(options);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(options: &TransportOptions) -> ClientBuilder {
    Client::builder()
        .connect_timeout(options.connect_timeout)
        .timeout(options.read_timeout)
        .user_agent(options.user_agent.clone())
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
