//! The scheduler seam driven by the lifecycle orchestrator.

use async_trait::async_trait;
use spawngrid_core::{JobStatus, ServiceEndpoint};
use spawngrid_transport::RemoteResult;

use crate::jobspec::JobSpec;
use crate::models::{Allocation, JobDocument, SubmittedJob};
use crate::status::derive_status;

/// Operations against a cluster scheduler. All calls are namespace-scoped
/// by the implementation.
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Create a CSI volume. Re-creating an existing volume succeeds.
    async fn create_volume(&self, volume_id: &str, plugin_id: &str) -> RemoteResult<()>;

    async fn delete_volume(&self, volume_id: &str) -> RemoteResult<()>;

    /// Parse, canonicalize and register a job.
    async fn submit_job(&self, spec: &JobSpec) -> RemoteResult<SubmittedJob>;

    async fn job_status(&self, job_id: &str) -> RemoteResult<JobDocument>;

    async fn list_allocations(&self, job_id: &str) -> RemoteResult<Vec<Allocation>>;

    async fn delete_job(&self, job_id: &str, purge: bool) -> RemoteResult<()>;

    /// Address of the single registration of `service`. Errors when there
    /// are none or several.
    async fn resolve_service_address(&self, service: &str) -> RemoteResult<ServiceEndpoint>;

    /// Host IP and first dynamic port of an allocation.
    async fn allocation_address(&self, allocation_id: &str) -> RemoteResult<ServiceEndpoint>;

    /// Aggregate status of a job.
    ///
    /// A job the scheduler itself reports as `dead` is dead regardless of
    /// what its allocations say.
    async fn current_status(&self, job_id: &str) -> RemoteResult<JobStatus> {
        let job = self.job_status(job_id).await?;
        if job.status == "dead" {
            return Ok(JobStatus::Dead);
        }
        let allocations = self.list_allocations(job_id).await?;
        Ok(derive_status(&allocations))
    }
}
