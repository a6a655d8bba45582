//! CLI entry point for gallery-extract.

use std::io::{self, IsTerminal, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use extractor_core::{
    Credentials, ExtractorConfig, ExtractorContext, ExtractorRegistry, Job, JobOptions, JobReport,
    Message, ReqwestTransport, RequestInterval, RetryPolicy, SessionCache, TransportOptions,
    default_registry,
};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr; stdout carries extraction output only.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let registry = default_registry();

    if args.list_extractors {
        print_extractors(&registry)?;
        return Ok(());
    }

    let urls = read_urls(&args)?;
    if urls.is_empty() {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: gallery-extract https://koharu.to/g/12345/67890abcde/");
        return Ok(());
    }

    let transport = ReqwestTransport::with_options(TransportOptions {
        connect_timeout: Duration::from_secs(args.connect_timeout),
        read_timeout: Duration::from_secs(args.timeout),
        retry: RetryPolicy::with_max_attempts(u32::from(args.retries)),
        interval: request_interval(&args, &registry),
        ..TransportOptions::default()
    })?;

    let mut ctx = ExtractorContext::new(Arc::new(transport)).with_config(build_config(&args));
    let cache = open_cache(&args).await;
    if let Some(cache) = &cache {
        ctx = ctx.with_cache(cache.clone());
    }

    let options = JobOptions {
        limit: args.limit.and_then(|limit| usize::try_from(limit).ok()),
        recursive: args.recursive,
        max_depth: usize::from(args.max_depth),
    };
    let job = Job::new(&registry, ctx, options);

    let mut report = JobReport::default();
    let stdout = io::stdout();
    for url in &urls {
        let mut out = stdout.lock();
        let result = job
            .run(url, |depth, message| {
                if let Err(error) = print_message(&mut out, depth, message, args.dump_json) {
                    warn!(error = %error, "failed to write output");
                }
            })
            .await;
        match result {
            Ok(url_report) => report.merge(url_report),
            Err(error) => {
                if let Some(cache) = cache {
                    cache.close().await;
                }
                return Err(error).with_context(|| format!("extraction aborted at {url}"));
            }
        }
    }

    if let Some(cache) = cache {
        cache.close().await;
    }

    info!(
        urls = urls.len(),
        messages = report.messages,
        items = report.items,
        failures = report.failures.len(),
        "Done"
    );

    if report.is_success() {
        return Ok(());
    }
    for failure in &report.failures {
        eprintln!("{}: {}", failure.url, failure.error);
    }
    std::process::exit(1);
}

/// Positional URLs, else non-empty stdin lines (skipping `#` comments).
fn read_urls(args: &Args) -> Result<Vec<String>> {
    let raw = if !args.urls.is_empty() {
        args.urls.join("\n")
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read URLs from stdin")?;
        buffer
    } else {
        String::new()
    };

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn build_config(args: &Args) -> ExtractorConfig {
    let mut config = ExtractorConfig::default().with_archive(!args.no_archive);
    if let Some(format) = &args.format {
        config = config.with_format(format);
    }
    if let Some(credentials) = Credentials::from_parts(args.username.clone(), args.password.clone()) {
        config = config.with_credentials(credentials);
    }
    for (name, url) in &args.endpoints {
        config = config.with_endpoint(name, url);
    }
    config
}

/// `--sleep-request` wins; otherwise the widest interval any site asks for.
fn request_interval(args: &Args, registry: &ExtractorRegistry) -> Option<Arc<RequestInterval>> {
    if let Some(seconds) = args.sleep_request {
        return (seconds > 0.0).then(|| Arc::new(RequestInterval::from_secs_f64(seconds, seconds)));
    }
    let (min, max) = registry
        .infos()
        .filter_map(|info| info.request_interval)
        .fold((0.0_f64, 0.0_f64), |(min, max), (lo, hi)| (min.max(lo), max.max(hi)));
    (max > 0.0).then(|| Arc::new(RequestInterval::from_secs_f64(min, max)))
}

/// Opens the session cache; a broken cache disables caching instead of failing.
async fn open_cache(args: &Args) -> Option<SessionCache> {
    if args.no_cache {
        debug!("session cache disabled");
        return None;
    }
    let path = match &args.cache_file {
        Some(path) => path.clone(),
        None => match SessionCache::default_path() {
            Ok(path) => path,
            Err(error) => {
                warn!(error = %error, "session cache unavailable");
                return None;
            }
        },
    };
    match SessionCache::open(&path).await {
        Ok(cache) => {
            debug!(path = %path.display(), "session cache opened");
            Some(cache)
        }
        Err(error) => {
            warn!(path = %path.display(), error = %error, "session cache unavailable");
            None
        }
    }
}

fn print_message(out: &mut impl Write, depth: usize, message: &Message, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, message)?;
        writeln!(out)?;
        return Ok(());
    }
    match message {
        Message::Url { url, .. } => writeln!(out, "{url}")?,
        Message::Queue { url, .. } => writeln!(out, "| {url}")?,
        Message::Directory { .. } | Message::Metadata { .. } => {
            debug!(depth, kind = ?message.kind(), "context message");
        }
    }
    Ok(())
}

fn print_extractors(registry: &ExtractorRegistry) -> Result<()> {
    let mut out = io::stdout().lock();
    for info in registry.infos() {
        writeln!(out, "{}", info.id)?;
        writeln!(out, "  Category: {} / {} / {}", info.category.group, info.category.site, info.category.kind)?;
        writeln!(out, "  Example : {}", info.example)?;
        writeln!(out)?;
    }
    Ok(())
}
