//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use extractor_core::job::DEFAULT_MAX_DEPTH;
use extractor_core::transport::DEFAULT_MAX_RETRIES;

/// Extract download URLs and metadata from gallery sites.
///
/// Each URL is matched against the built-in extractors; the resulting
/// messages are printed as plain URLs or, with --dump-json, as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "gallery-extract")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to extract (read from stdin when omitted)
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Download format id ("original" for the source files)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Request single images instead of packaged archives
    #[arg(long)]
    pub no_archive: bool,

    /// Account name for sites that need a login
    #[arg(short, long, env = "GALLERY_EXTRACT_USERNAME")]
    pub username: Option<String>,

    /// Account password
    #[arg(short, long, env = "GALLERY_EXTRACT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Session cache file (defaults to the user config directory)
    #[arg(long, env = "GALLERY_EXTRACT_CACHE")]
    pub cache_file: Option<PathBuf>,

    /// Do not read or write the session cache
    #[arg(long, conflicts_with = "cache_file")]
    pub no_cache: bool,

    /// Stop after this many items
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub limit: Option<u64>,

    /// Follow queued URLs into their extractor
    #[arg(short = 'R', long)]
    pub recursive: bool,

    /// Maximum depth when following queued URLs (1-16)
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH as u8, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub max_depth: u8,

    /// Print every message as a JSON line
    #[arg(short = 'j', long)]
    pub dump_json: bool,

    /// List supported extractors and exit
    #[arg(long)]
    pub list_extractors: bool,

    /// Maximum attempts for transient failures (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub retries: u8,

    /// Seconds to wait between requests to the same host (overrides site defaults; 0 disables)
    #[arg(long, value_parser = parse_seconds)]
    pub sleep_request: Option<f64>,

    /// TCP connect timeout in seconds (1-300)
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=300))]
    pub connect_timeout: u64,

    /// Whole-request timeout in seconds (1-3600)
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: u64,

    /// Override a site endpoint, as NAME=URL (root, api, auth)
    #[arg(long = "endpoint", value_name = "NAME=URL", value_parser = parse_endpoint)]
    pub endpoints: Vec<(String, String)>,
}

fn parse_seconds(value: &str) -> Result<f64, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number of seconds"))?;
    if !seconds.is_finite() || !(0.0..=3600.0).contains(&seconds) {
        return Err(format!("'{value}' must be between 0 and 3600 seconds"));
    }
    Ok(seconds)
}

fn parse_endpoint(value: &str) -> Result<(String, String), String> {
    let (name, url) = value
        .split_once('=')
        .ok_or_else(|| format!("'{value}' is not NAME=URL"))?;
    let name = name.trim();
    let url = url.trim();
    if name.is_empty() || url.is_empty() {
        return Err(format!("'{value}' is not NAME=URL"));
    }
    url::Url::parse(url).map_err(|e| format!("invalid endpoint URL '{url}': {e}"))?;
    Ok((name.to_string(), url.to_string()))
}
