//! Consul health API client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use spawngrid_core::RegistrySettings;
use spawngrid_transport::{ApiClient, RemoteResult};

use crate::{RegistryClient, ServiceInstance};

/// Header carrying the Consul ACL token.
pub const TOKEN_HEADER: &str = "x-consul-token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthEntry {
    node: NodeEntry,
    service: ServiceEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeEntry {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceEntry {
    #[serde(default)]
    address: String,
    port: u16,
}

impl HealthEntry {
    /// Services registered without an address inherit the node's.
    fn into_instance(self) -> ServiceInstance {
        let address = if self.service.address.is_empty() {
            self.node.address
        } else {
            self.service.address
        };
        ServiceInstance {
            address,
            port: self.service.port,
        }
    }
}

/// Registry backed by Consul's `/v1/health/service` endpoint.
#[derive(Clone)]
pub struct ConsulRegistry {
    api: ApiClient,
}

impl ConsulRegistry {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Build from config: address, token and TLS material.
    pub fn from_settings(settings: &RegistrySettings) -> RemoteResult<Self> {
        let api = ApiClient::new(&settings.address, &settings.tls)?
            .with_token(TOKEN_HEADER, settings.token.as_deref())?;
        Ok(Self::new(api))
    }
}

#[async_trait]
impl RegistryClient for ConsulRegistry {
    async fn healthy_instances(&self, service: &str) -> RemoteResult<Vec<ServiceInstance>> {
        let path = format!("/v1/health/service/{service}");
        let entries: Vec<HealthEntry> = self.api.get_json(&path, &[("passing", "true")]).await?;
        let instances: Vec<ServiceInstance> =
            entries.into_iter().map(HealthEntry::into_instance).collect();
        debug!(%service, count = instances.len(), "consul healthy instances");
        Ok(instances)
    }
}
