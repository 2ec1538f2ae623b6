//! JWKS endpoint mocks

use crate::keys::TestKeypair;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mocks serve the key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// JWKS document publishing the given keys.
pub fn jwks_document(keys: &[&TestKeypair]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

/// Full JWKS URL on `server`.
pub fn jwks_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), JWKS_PATH)
}

/// Serve `keys` as the key set on `server`.
pub async fn mount_jwks(server: &MockServer, keys: &[&TestKeypair]) {
    mount_jwks_document(server, jwks_document(keys)).await;
}

/// Serve an arbitrary JSON document as the key set on `server`.
pub async fn mount_jwks_document(server: &MockServer, document: Value) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(server)
        .await;
}

/// Make the key set endpoint fail with `status`.
pub async fn mount_jwks_failure(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}
