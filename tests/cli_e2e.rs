//! End-to-end CLI tests for the gallery-extract binary.

// `Command::cargo_bin` is deprecated in assert_cmd >=2.0.17 in favor of
// `cargo::cargo_bin_cmd!` macro. Suppressed until migration to the new API.
#![allow(deprecated)]

mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use support::fixtures::{gallery_record, listing_page};
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("gallery-extract").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("GALLERY_EXTRACT_USERNAME")
        .env_remove("GALLERY_EXTRACT_PASSWORD")
        .env_remove("GALLERY_EXTRACT_CACHE");
    cmd
}

fn endpoint_args(server: &MockServer) -> Vec<String> {
    let uri = server.uri();
    vec![
        "--endpoint".to_string(),
        format!("root={uri}"),
        "--endpoint".to_string(),
        format!("api={uri}"),
        "--endpoint".to_string(),
        format!("auth={uri}/login"),
        "--sleep-request".to_string(),
        "0".to_string(),
        "--no-cache".to_string(),
        "-r".to_string(),
        "1".to_string(),
    ]
}

#[test]
fn test_binary_invocation_without_input_returns_zero() {
    cmd().write_stdin("").assert().success();
}

#[test]
fn test_binary_help_displays_usage() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Extract download URLs and metadata"))
        .stdout(predicate::str::contains("--dump-json"));
}

#[test]
fn test_binary_version_displays_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gallery-extract"));
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    cmd()
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_lists_extractors() {
    cmd()
        .arg("--list-extractors")
        .assert()
        .success()
        .stdout(predicate::str::contains("koharu:gallery"))
        .stdout(predicate::str::contains("koharu:search"))
        .stdout(predicate::str::contains("koharu:favorite"))
        .stdout(predicate::str::contains("https://koharu.to/g/12345/67890abcde/"));
}

#[test]
fn test_binary_unsupported_url_exits_one() {
    cmd()
        .args(["--no-cache", "https://example.com/nothing"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no extractor found"));
}

#[test]
fn test_binary_favorites_without_credentials_exits_one() {
    cmd()
        .args(["--no-cache", "https://koharu.to/favorites"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("authentication required"));
}

#[tokio::test]
async fn test_binary_prints_queue_urls_for_search() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/books"))
        .and(query_param("s", "cat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_page(&[1, 2], 2, 1, 2)))
        .expect(1)
        .mount(&server)
        .await;

    cmd()
        .args(endpoint_args(&server))
        .arg("https://koharu.to/?s=cat")
        .assert()
        .success()
        .stdout("| https://koharu.to/g/1/k1\n| https://koharu.to/g/2/k2\n");
}

#[tokio::test]
async fn test_binary_recursive_dump_json_from_stdin() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_page(&[7], 25, 1, 1)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/books/detail/7/k7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gallery_record(7, "k7")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/books/data/7/k7/900/orig"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"base": "https://dl.example/7.cbz"})),
        )
        .mount(&server)
        .await;

    let output = cmd()
        .args(endpoint_args(&server))
        .args(["--recursive", "--dump-json"])
        .write_stdin("# comment\nhttps://koharu.to/?s=x\n\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let lines: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let kinds: Vec<&str> = lines.iter().map(|v| v["kind"].as_str().unwrap()).collect();
    assert_eq!(kinds, ["Metadata", "Queue", "Directory", "Url"]);
    assert_eq!(lines[1]["_extractor"], "koharu:gallery");
    assert_eq!(lines[1]["url"], "https://koharu.to/g/7/k7");
    assert_eq!(lines[2]["metadata"]["title"], "Gallery 7");
    assert_eq!(lines[3]["url"], "https://dl.example/7.cbz?v=1700000100&w=0");
}

#[tokio::test]
async fn test_binary_limit_stops_after_items() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_page(&[1, 2, 3], 3, 1, 9)))
        .expect(1)
        .mount(&server)
        .await;

    cmd()
        .args(endpoint_args(&server))
        .args(["--limit", "2", "https://koharu.to/?s=x"])
        .assert()
        .success()
        .stdout("| https://koharu.to/g/1/k1\n| https://koharu.to/g/2/k2\n");
}

#[tokio::test]
async fn test_binary_uses_cache_file_for_login() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"session": "tok"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/favorites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_page(&[4], 25, 1, 1)))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache_file = dir.path().join("cache.sqlite3");
    let uri = server.uri();
    for _ in 0..2 {
        cmd()
            .arg("--endpoint")
            .arg(format!("api={uri}"))
            .arg("--endpoint")
            .arg(format!("root={uri}"))
            .arg("--endpoint")
            .arg(format!("auth={uri}/login"))
            .args(["--sleep-request", "0", "-r", "1"])
            .arg("--cache-file")
            .arg(&cache_file)
            .env("GALLERY_EXTRACT_USERNAME", "alice")
            .env("GALLERY_EXTRACT_PASSWORD", "secret")
            .arg("https://koharu.to/favorites")
            .assert()
            .success()
            .stdout("| https://koharu.to/g/4/k4\n");
    }
}
