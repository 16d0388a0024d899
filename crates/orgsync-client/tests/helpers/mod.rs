//! Shared fixtures for client tests.

#![allow(dead_code)]

use orgsync_client::auth::CatalogAuth;
use orgsync_client::catalog::{DataspotClient, DataspotConfig};
use orgsync_client::retry::RetryPolicy;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::MockServer;

pub const TOKEN: &str = "test-token-123";
pub const UNIT_ID: &str = "6f1c2a4e-9b0d-4c3e-8a71-2d5f0e9b1c33";

pub fn config(server: &MockServer) -> DataspotConfig {
    DataspotConfig {
        base_url: server.uri(),
        database: "prod".to_string(),
        scheme: "DNK".to_string(),
        timeout: Duration::from_secs(5),
    }
}

/// Client pointing at the mock server without retries.
pub fn catalog_client(server: &MockServer) -> DataspotClient {
    catalog_client_with_retry(server, RetryPolicy::none())
}

pub fn catalog_client_with_retry(server: &MockServer, retry: RetryPolicy) -> DataspotClient {
    DataspotClient::with_http_client(
        config(server),
        CatalogAuth::bearer(TOKEN),
        retry,
        reqwest::Client::new(),
    )
}

pub fn unit_json(id: &str, label: &str, parent: Option<&str>, external_id: &str) -> Value {
    json!({
        "id": id,
        "_type": "Collection",
        "stereotype": "Organisationseinheit",
        "label": label,
        "inCollection": parent,
        "customProperties": {
            "id_im_staatskalender": external_id,
            "link_zum_staatskalender": format!("https://staatskalender.bs.ch/organization/{external_id}")
        }
    })
}
