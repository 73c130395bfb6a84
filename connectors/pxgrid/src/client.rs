//! Control-plane REST client.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use igm_backoff::{BackoffResult, RetryPolicy, retry_until};
use igm_telemetry::log_exchange;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};

use crate::{AccessSecret, ControlPlaneConfig, PxgridError, PxgridResult, ServiceDescriptor};

const ACCOUNT_ENABLED: &str = "ENABLED";

/// Longest response body kept in an [`PxgridError::Api`].
const MAX_ERROR_BODY: usize = 512;

/// Authenticated client for the control plane.
///
/// Calls that need an active account activate it first, once; the account
/// state and looked-up services are remembered for the life of the client.
pub struct ControlPlaneClient {
    config: Arc<ControlPlaneConfig>,
    http: Client,
    base_url: String,
    activation: RetryPolicy,
    account_active: AtomicBool,
    services: RwLock<HashMap<String, ServiceDescriptor>>,
}

impl fmt::Debug for ControlPlaneClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPlaneClient")
            .field("base_url", &self.base_url)
            .field("nodename", &self.config.nodename)
            .field("account_active", &self.is_account_active())
            .finish_non_exhaustive()
    }
}

impl ControlPlaneClient {
    /// Build a client from the connection settings.
    ///
    /// # Errors
    /// Fails when the TLS material cannot be loaded or the HTTP client fails
    /// to build.
    pub fn new(config: ControlPlaneConfig) -> PxgridResult<Self> {
        let tls = config.tls_settings().client_config()?;
        let http = Client::builder()
            .use_preconfigured_tls(tls)
            .timeout(config.timeout)
            .user_agent(concat!("igm-pxgrid/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: config.control_url(),
            config: Arc::new(config),
            http,
            activation: RetryPolicy::default(),
            account_active: AtomicBool::new(false),
            services: RwLock::new(HashMap::new()),
        })
    }

    /// Set a custom control-plane base URL (for testing). A trailing slash
    /// is added when missing.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.base_url = url;
        self
    }

    /// Replace the activation retry policy (default: 10 Fibonacci-spaced
    /// attempts).
    #[must_use]
    pub fn with_activation_policy(mut self, policy: RetryPolicy) -> Self {
        self.activation = policy;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the account is known to be enabled.
    #[must_use]
    pub fn is_account_active(&self) -> bool {
        self.account_active.load(Ordering::SeqCst)
    }

    /// Activate the account, polling until the control plane reports it
    /// enabled or the attempt budget runs out.
    ///
    /// Returns `false` on exhaustion; failed requests count as not-ready
    /// attempts.
    pub async fn activate_account(&self) -> bool {
        self.activate().await.is_ok()
    }

    #[instrument(skip(self), fields(nodename = %self.config.nodename))]
    async fn activate(&self) -> BackoffResult<bool> {
        let outcome = retry_until(
            self.activation.clone(),
            |attempt| self.activate_once(attempt),
            |enabled| *enabled,
        )
        .await;

        let attempts = outcome.attempts();
        let result = outcome.into_result();
        self.account_active.store(result.is_ok(), Ordering::SeqCst);
        if result.is_ok() {
            info!(attempts, "Control-plane account enabled");
        } else {
            warn!(
                attempts,
                "Control-plane account not enabled; approve the client on the control plane"
            );
        }
        result
    }

    async fn activate_once(&self, attempt: u32) -> bool {
        let mut payload = Map::new();
        if let Some(description) = self.config.description.as_deref().filter(|d| !d.is_empty()) {
            payload.insert("description".into(), Value::String(description.to_string()));
        }
        let url = format!("{}AccountActivate", self.base_url);
        match self.send("AccountActivate", &url, &Value::Object(payload)).await {
            Ok(response) => {
                let state = response.get("accountState").and_then(Value::as_str);
                debug!(attempt, state = state.unwrap_or("<none>"), "AccountActivate");
                state == Some(ACCOUNT_ENABLED)
            }
            Err(err) => {
                warn!(attempt, error = %err, "AccountActivate failed");
                false
            }
        }
    }

    /// POST `payload` to a control-plane endpoint.
    ///
    /// With `require_active` the account is activated first if it is not
    /// known to be enabled. Bodies that are empty or not a JSON object come
    /// back as an empty object.
    ///
    /// # Errors
    /// Fails on transport errors, non-success statuses, or when activation
    /// is required and does not succeed.
    pub async fn request(
        &self,
        endpoint: &str,
        payload: &Value,
        require_active: bool,
    ) -> PxgridResult<Value> {
        let url = format!("{}{endpoint}", self.base_url);
        self.request_url(&url, payload, require_active).await
    }

    /// Like [`request`](Self::request) against a full URL, for services that
    /// publish their own REST base.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    pub async fn request_url(
        &self,
        url: &str,
        payload: &Value,
        require_active: bool,
    ) -> PxgridResult<Value> {
        if require_active && !self.is_account_active() {
            self.activate().await?;
        }
        let endpoint = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
        self.send(endpoint, url, payload).await
    }

    async fn send(&self, endpoint: &str, url: &str, payload: &Value) -> PxgridResult<Value> {
        let (user, password) = self.config.basic_auth();
        let started = Instant::now();

        let response = self
            .http
            .post(url)
            .basic_auth(user, Some(password))
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        let parsed = serde_json::from_str::<Value>(&body)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Map::new()));

        log_exchange(endpoint, status.as_u16(), started.elapsed(), payload, &parsed);

        if !status.is_success() {
            let mut body = body;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(PxgridError::Api {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(parsed)
    }

    /// Resolve a service by name. Results are cached for the life of the
    /// client.
    ///
    /// # Errors
    /// Returns [`PxgridError::ServiceNotFound`] when the lookup lists no
    /// services, or any [`request`](Self::request) error.
    #[instrument(skip(self))]
    pub async fn lookup_service(&self, name: &str) -> PxgridResult<ServiceDescriptor> {
        if let Some(cached) = self.services.read().get(name) {
            return Ok(cached.clone());
        }

        let response = self
            .request("ServiceLookup", &json!({ "name": name }), true)
            .await?;
        let first = response
            .get("services")
            .and_then(Value::as_array)
            .and_then(|services| services.first())
            .cloned()
            .ok_or_else(|| PxgridError::ServiceNotFound {
                service: name.to_string(),
            })?;
        let descriptor: ServiceDescriptor =
            serde_json::from_value(first).map_err(|e| PxgridError::MissingField {
                endpoint: "ServiceLookup".into(),
                field: format!("services[0] ({e})"),
            })?;

        debug!(service = name, node = %descriptor.node_name, "Service resolved");
        self.services
            .write()
            .insert(name.to_string(), descriptor.clone());
        Ok(descriptor)
    }

    /// Fetch the access secret for talking to `peer_node`.
    ///
    /// # Errors
    /// Fails when the response has no `secret`, or on any request error.
    #[instrument(skip(self))]
    pub async fn get_access_secret(&self, peer_node: &str) -> PxgridResult<AccessSecret> {
        let response = self
            .request("AccessSecret", &json!({ "peerNodeName": peer_node }), true)
            .await?;
        let secret = response
            .get("secret")
            .and_then(Value::as_str)
            .ok_or_else(|| PxgridError::MissingField {
                endpoint: "AccessSecret".into(),
                field: "secret".into(),
            })?;
        Ok(AccessSecret::new(peer_node, secret))
    }
}
