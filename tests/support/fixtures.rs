use std::sync::Arc;
use std::time::Duration;

use extractor_core::{
    ExtractorConfig, ExtractorContext, ReqwestTransport, RetryPolicy, TransportOptions,
};
use serde_json::{Value, json};
use wiremock::MockServer;

/// Config whose site endpoints all point at the mock server.
pub fn mock_config(server: &MockServer) -> ExtractorConfig {
    ExtractorConfig::default()
        .with_endpoint("root", server.uri())
        .with_endpoint("api", server.uri())
        .with_endpoint("auth", format!("{}/login", server.uri()))
}

/// Transport with fast retries and no pacing.
pub fn fast_transport(max_attempts: u32) -> ReqwestTransport {
    ReqwestTransport::with_options(TransportOptions {
        retry: RetryPolicy::new(
            max_attempts,
            Duration::from_millis(10),
            Duration::from_millis(50),
            2.0,
        ),
        ..TransportOptions::default()
    })
    .unwrap()
}

pub fn mock_context(server: &MockServer) -> ExtractorContext {
    ExtractorContext::new(Arc::new(fast_transport(1))).with_config(mock_config(server))
}

pub fn gallery_record(id: u64, key: &str) -> Value {
    json!({
        "id": id,
        "public_key": key,
        "title": format!("Gallery {id}"),
        "created_at": 1_700_000_000_000_i64,
        "updated_at": 1_700_000_100,
        "tags": [{"name": "alice", "namespace": 1}, {"name": "english", "namespace": 11}],
        "rels": [],
        "thumbnails": {},
        "data": {
            "0": {"id": 900, "public_key": "orig"},
            "1600": {"id": 901, "public_key": "resampled"}
        }
    })
}

pub fn listing_page(ids: &[u64], limit: u64, page: u64, total: u64) -> Value {
    let entries: Vec<Value> = ids
        .iter()
        .map(|id| json!({"id": id, "public_key": format!("k{id}"), "title": format!("Gallery {id}")}))
        .collect();
    json!({"entries": entries, "limit": limit, "page": page, "total": total})
}
