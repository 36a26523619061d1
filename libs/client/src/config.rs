//! Cluster connection descriptor.

use std::time::Duration;

use crate::error::ClientError;

/// Environment variable naming an existing control plane to attach to.
pub const ENV_CLUSTER_ENDPOINT: &str = "SORTIE_CLUSTER_ENDPOINT";

/// Environment variable overriding the per-request timeout, in seconds.
pub const ENV_CLUSTER_TIMEOUT_SECS: &str = "SORTIE_CLUSTER_TIMEOUT_SECS";

/// How to reach a control plane.
///
/// Passed unmodified from the environment to the manager and the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Base URL, e.g. `http://127.0.0.1:6443`.
    pub endpoint: String,

    /// Timeout applied to every request.
    pub request_timeout: Duration,
}

impl ClusterConfig {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read a cluster override from the environment.
    ///
    /// Returns `Ok(None)` when no endpoint is configured.
    pub fn from_env() -> Result<Option<Self>, ClientError> {
        let Ok(endpoint) = std::env::var(ENV_CLUSTER_ENDPOINT) else {
            return Ok(None);
        };
        if endpoint.trim().is_empty() {
            return Ok(None);
        }

        let mut config = Self::new(endpoint.trim());
        if let Ok(secs) = std::env::var(ENV_CLUSTER_TIMEOUT_SECS) {
            let secs: u64 = secs.parse().map_err(|_| {
                ClientError::InvalidConfig(format!("{ENV_CLUSTER_TIMEOUT_SECS}={secs}"))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(Some(config))
    }

    /// Check the endpoint is an http(s) URL.
    pub fn validate(&self) -> Result<(), ClientError> {
        let endpoint = self.endpoint.trim();
        let has_scheme = endpoint.starts_with("http://") || endpoint.starts_with("https://");
        let has_host = endpoint
            .split_once("://")
            .is_some_and(|(_, rest)| !rest.trim_end_matches('/').is_empty());

        if has_scheme && has_host {
            Ok(())
        } else {
            Err(ClientError::InvalidConfig(format!(
                "cluster endpoint must be an http(s) URL, got {endpoint:?}"
            )))
        }
    }

    /// Endpoint without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim().trim_end_matches('/')
    }
}
