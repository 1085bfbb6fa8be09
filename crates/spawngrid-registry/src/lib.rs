//! spawngrid-registry — service discovery for provisioned workloads.
//!
//! The lifecycle orchestrator only needs one question answered: which
//! healthy instances does a service name currently have? `RegistryClient`
//! is that seam. `ConsulRegistry` answers it from Consul's health API;
//! the scheduler crate provides a second implementation over the
//! scheduler's own service catalog.

pub mod consul;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spawngrid_core::ServiceEndpoint;
use spawngrid_transport::RemoteResult;

pub use consul::ConsulRegistry;

/// One healthy instance of a registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub address: String,
    pub port: u16,
}

impl From<ServiceInstance> for ServiceEndpoint {
    fn from(instance: ServiceInstance) -> Self {
        ServiceEndpoint {
            address: instance.address,
            port: instance.port,
        }
    }
}

/// Read-only view of a service registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Healthy instances registered under `service`.
    ///
    /// An unknown service yields an empty list, not an error.
    async fn healthy_instances(&self, service: &str) -> RemoteResult<Vec<ServiceInstance>>;
}
