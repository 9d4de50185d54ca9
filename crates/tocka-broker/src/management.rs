//! Control-plane client for the broker's HTTP management API.
//!
//! Group membership is never stored by the chat layer; it is read back
//! from the broker's binding tables. A group's members are the queues its
//! exchange fans out to, and a user's groups are the exchanges bound to
//! their queue.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tocka_shared::constants::BROKER_INTERNAL_PREFIX;

use crate::config::BrokerConfig;
use crate::error::ControlPlaneError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One row of a management API bindings listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub destination_type: String,
    #[serde(default)]
    pub routing_key: String,
}

impl Binding {
    pub fn to_queue(source: &str, queue: &str, routing_key: &str) -> Self {
        Self {
            source: source.to_string(),
            destination: queue.to_string(),
            destination_type: "queue".to_string(),
            routing_key: routing_key.to_string(),
        }
    }
}

/// Read-only view of broker topology.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Bindings whose source is `exchange`.
    async fn exchange_bindings(&self, exchange: &str) -> Result<Vec<Binding>, ControlPlaneError>;

    /// Bindings whose destination is `queue`.
    async fn queue_bindings(&self, queue: &str) -> Result<Vec<Binding>, ControlPlaneError>;
}

/// Distinct binding destinations, sorted.
pub fn members_from_bindings(bindings: &[Binding]) -> Vec<String> {
    bindings
        .iter()
        .map(|b| b.destination.as_str())
        .filter(|d| !d.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Distinct binding sources, sorted, without the default exchange or
/// broker-internal (`amq.*`) exchanges.
pub fn groups_from_bindings(bindings: &[Binding]) -> Vec<String> {
    bindings
        .iter()
        .map(|b| b.source.as_str())
        .filter(|s| !s.is_empty() && !s.starts_with(BROKER_INTERNAL_PREFIX))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Basic-auth client for `/api/...` management endpoints.
pub struct ManagementClient {
    http: reqwest::Client,
    base_url: Url,
    vhost: String,
    username: String,
    password: String,
}

impl ManagementClient {
    pub fn new(
        base_url: &str,
        vhost: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ControlPlaneError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ControlPlaneError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ControlPlaneError::InvalidUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http,
            base_url,
            vhost: vhost.into(),
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn from_config(config: &BrokerConfig) -> Result<Self, ControlPlaneError> {
        Self::new(
            &config.management_url(),
            config.vhost.clone(),
            config.username.clone(),
            config.password.clone(),
        )
    }

    /// `<base>/api/<segments...>`, each segment percent-escaped (so the
    /// default vhost `/` becomes `%2F`).
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ControlPlaneError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ControlPlaneError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    async fn get_bindings(&self, url: Url) -> Result<Vec<Binding>, ControlPlaneError> {
        debug!(url = %url, "Querying management API");

        let response = self
            .http
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ControlPlaneError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json::<Vec<Binding>>()
            .await
            .map_err(|e| ControlPlaneError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ControlPlane for ManagementClient {
    async fn exchange_bindings(&self, exchange: &str) -> Result<Vec<Binding>, ControlPlaneError> {
        let url = self.endpoint(&["exchanges", &self.vhost, exchange, "bindings", "source"])?;
        self.get_bindings(url).await
    }

    async fn queue_bindings(&self, queue: &str) -> Result<Vec<Binding>, ControlPlaneError> {
        let url = self.endpoint(&["queues", &self.vhost, queue, "bindings"])?;
        self.get_bindings(url).await
    }
}
