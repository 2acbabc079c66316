//! Shared fixtures for integration tests against a mocked Keep API.

#![allow(dead_code)]

use std::sync::Arc;

use keep_provider::KeepProvider;
use keep_provider::client::HttpTransport;
use keep_provider::config::ProviderConfig;
use serde_json::Value;
use wiremock::MockServer;

pub const TEST_API_KEY: &str = "test-api-key";

/// Configuration pointing at the mock server.
pub fn config_for(server: &MockServer, api_key: Option<&str>) -> ProviderConfig {
    ProviderConfig {
        api_key: api_key.map(str::to_string),
        api_url: server.uri(),
        timeout_secs: 5,
        ..ProviderConfig::default()
    }
}

/// Provider whose resources all talk to `server` with [`TEST_API_KEY`].
pub fn provider_for(server: &MockServer) -> KeepProvider {
    let config = config_for(server, Some(TEST_API_KEY));
    let transport = HttpTransport::from_config(&config).expect("transport builds");
    KeepProvider::with_transport(config, Arc::new(transport))
}

/// Method and path of every request the server saw, in order.
pub async fn request_log(server: &MockServer) -> Vec<(String, String)> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| (request.method.to_string(), request.url.path().to_string()))
        .collect()
}

/// JSON bodies of the requests sent with `method` to `path`.
pub async fn sent_bodies(server: &MockServer, method: &str, path: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.method.as_str() == method && request.url.path() == path)
        .map(|request| serde_json::from_slice(&request.body).expect("request body is JSON"))
        .collect()
}
