//! Mock HTTP server for the control plane and the network controller.
//!
//! Wraps wiremock with the endpoints the bridge talks to.

use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path prefix of the control-plane endpoints.
pub const CONTROL_PREFIX: &str = "/pxgrid/control";

/// Path prefix of the session service REST base.
pub const SESSION_REST_PREFIX: &str = "/pxgrid/mnt/sd";

/// A mock API server.
pub struct MockApiServer {
    server: MockServer,
}

/// A recorded HTTP request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Request body parsed as JSON (`Null` if it was not JSON)
    pub body: Value,
    /// Request headers
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    /// First header value with the given (case-insensitive) name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl MockApiServer {
    /// Start a new mock server.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of the mock server.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    /// Control-plane base URL, with trailing slash.
    #[must_use]
    pub fn control_url(&self) -> String {
        format!("{}{CONTROL_PREFIX}/", self.server.uri())
    }

    /// Session service REST base URL.
    #[must_use]
    pub fn session_rest_url(&self) -> String {
        format!("{}{SESSION_REST_PREFIX}", self.server.uri())
    }

    /// Underlying wiremock server for advanced configuration.
    #[must_use]
    pub const fn inner(&self) -> &MockServer {
        &self.server
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Generic
    // ─────────────────────────────────────────────────────────────────────────────

    /// Respond to POST `request_path` with JSON.
    pub async fn expect_post(&self, request_path: &str, response: Value) {
        Mock::given(method("POST"))
            .and(path(request_path))
            .respond_with(json_response(200, response))
            .mount(&self.server)
            .await;
    }

    /// Respond to POST `request_path` with JSON when the body matches.
    pub async fn expect_post_with_body(&self, request_path: &str, expected_body: Value, response: Value) {
        Mock::given(method("POST"))
            .and(path(request_path))
            .and(body_json(&expected_body))
            .respond_with(json_response(200, response))
            .mount(&self.server)
            .await;
    }

    /// Respond to `request_path` with an error status.
    pub async fn expect_error(&self, request_path: &str, status: u16, error_body: Value) {
        Mock::given(path(request_path))
            .respond_with(json_response(status, error_body))
            .mount(&self.server)
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Control plane
    // ─────────────────────────────────────────────────────────────────────────────

    /// `AccountActivate` answers `ENABLED`.
    pub async fn expect_account_enabled(&self) {
        self.expect_account_state("ENABLED").await;
    }

    /// `AccountActivate` answers `state`.
    pub async fn expect_account_state(&self, state: &str) {
        self.expect_post(
            &format!("{CONTROL_PREFIX}/AccountActivate"),
            json!({ "accountState": state }),
        )
        .await;
    }

    /// `ServiceLookup` for `name` returns one service.
    pub async fn expect_service(&self, name: &str, node_name: &str, properties: Value) {
        self.expect_post_with_body(
            &format!("{CONTROL_PREFIX}/ServiceLookup"),
            json!({ "name": name }),
            json!({
                "services": [{
                    "name": name,
                    "nodeName": node_name,
                    "properties": properties,
                }]
            }),
        )
        .await;
    }

    /// `ServiceLookup` for `name` answers like [`Self::expect_service`], but
    /// only after `delay`. Mount it before any other lookup for `name`.
    pub async fn expect_slow_service(&self, name: &str, node_name: &str, properties: Value, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(format!("{CONTROL_PREFIX}/ServiceLookup")))
            .and(body_json(json!({ "name": name })))
            .respond_with(
                json_response(
                    200,
                    json!({
                        "services": [{
                            "name": name,
                            "nodeName": node_name,
                            "properties": properties,
                        }]
                    }),
                )
                .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// `ServiceLookup` for `name` returns no services.
    pub async fn expect_no_service(&self, name: &str) {
        self.expect_post_with_body(
            &format!("{CONTROL_PREFIX}/ServiceLookup"),
            json!({ "name": name }),
            json!({ "services": [] }),
        )
        .await;
    }

    /// `AccessSecret` for `peer` returns `secret`.
    pub async fn expect_access_secret(&self, peer: &str, secret: &str) {
        self.expect_post_with_body(
            &format!("{CONTROL_PREFIX}/AccessSecret"),
            json!({ "peerNodeName": peer }),
            json!({ "secret": secret }),
        )
        .await;
    }

    /// Enabled account, a session service whose REST base is this server,
    /// and a pub/sub service at `ws_url`.
    pub async fn expect_session_discovery(&self, ws_url: &str, secret: &str) {
        self.expect_account_enabled().await;
        self.expect_service(
            "com.cisco.ise.session",
            "ise-mnt",
            json!({
                "restBaseUrl": self.session_rest_url(),
                "wsPubsubService": "com.cisco.ise.pubsub",
                "sessionTopic": "/topic/com.cisco.ise.session",
            }),
        )
        .await;
        self.expect_service(
            "com.cisco.ise.pubsub",
            "ise-pubsub",
            json!({ "wsUrl": ws_url }),
        )
        .await;
        self.expect_access_secret("ise-pubsub", secret).await;
    }

    /// `getUserGroupByUserName` for `user` returns `groups`.
    pub async fn expect_user_groups(&self, user: &str, groups: Value) {
        self.expect_post_with_body(
            &format!("{SESSION_REST_PREFIX}/getUserGroupByUserName"),
            json!({ "userName": user }),
            json!({ "groups": groups }),
        )
        .await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Network controller
    // ─────────────────────────────────────────────────────────────────────────────

    /// Client provisioning on `network_id` succeeds, echoing a summary.
    pub async fn expect_provision(&self, network_id: &str) {
        self.expect_post(
            &provision_path(network_id),
            json!({ "clients": [], "devicePolicy": "Group policy" }),
        )
        .await;
    }

    /// Client provisioning on `network_id` fails with `errors`.
    pub async fn expect_provision_error(&self, network_id: &str, status: u16, errors: &[&str]) {
        self.expect_error(&provision_path(network_id), status, json!({ "errors": errors }))
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Recording
    // ─────────────────────────────────────────────────────────────────────────────

    /// All requests received so far.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|r| RecordedRequest {
                method: r.method.to_string(),
                path: r.url.path().to_string(),
                body: serde_json::from_slice(&r.body).unwrap_or(Value::Null),
                headers: r
                    .headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                    .collect(),
            })
            .collect()
    }

    /// Requests whose path ends with `suffix`.
    pub async fn requests_to(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.path.ends_with(suffix))
            .collect()
    }
}

/// Provisioning path for a network.
#[must_use]
pub fn provision_path(network_id: &str) -> String {
    format!("/networks/{network_id}/clients/provision")
}

fn json_response(status: u16, body: Value) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_json(body)
        .insert_header("content-type", "application/json")
}
