//! Job spec rendering.
//!
//! `WorkloadSpecBuilder` is a pure function of its inputs: the same
//! identity and parameters always render the same HCL. Every string that
//! reaches the template is quoted here, so the template only places
//! already-escaped literals.

use askama::Template;
use tracing::debug;

use spawngrid_core::{MountKind, ValidationError, VolumeMount, WorkloadIdentity, WorkloadParams};

use crate::error::{SpecError, SpecResult};

/// Container port the notebook server listens on.
pub const NOTEBOOK_PORT: u16 = 8888;

/// A rendered job, ready for `SchedulerClient::submit_job`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub job_id: String,
    pub hcl: String,
}

struct VolumeView {
    kind: &'static str,
    csi: bool,
    source: String,
    destination: String,
}

#[derive(Template)]
#[template(path = "job.hcl", escape = "none")]
struct JobTemplate {
    job_id: String,
    workload_id: String,
    datacenters: String,
    service_name: String,
    port_label: String,
    container_port: u16,
    image: String,
    has_args: bool,
    args: String,
    env: Vec<(String, String)>,
    memory_mb: u64,
    cpu_mhz: Option<u32>,
    volume: Option<VolumeView>,
}

/// Renders workload parameters into a scheduler job document.
#[derive(Debug, Clone)]
pub struct WorkloadSpecBuilder {
    port_label: String,
    container_port: u16,
}

impl Default for WorkloadSpecBuilder {
    fn default() -> Self {
        Self {
            port_label: "notebook".to_string(),
            container_port: NOTEBOOK_PORT,
        }
    }
}

impl WorkloadSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the container port the dynamic port maps to.
    pub fn with_container_port(mut self, port: u16) -> Self {
        self.container_port = port;
        self
    }

    /// Render the job for `identity`.
    ///
    /// `volume` is the resolved mount: for CSI its source is the volume ID
    /// created during provisioning.
    pub fn build(
        &self,
        identity: &WorkloadIdentity,
        params: &WorkloadParams,
        volume: Option<&VolumeMount>,
    ) -> SpecResult<JobSpec> {
        params.validate()?;
        let volume = volume.map(volume_view).transpose()?;

        let template = JobTemplate {
            job_id: quote(&identity.job_id)?,
            workload_id: quote(&identity.workload_id)?,
            datacenters: quote_list(&params.datacenters)?,
            service_name: quote(&identity.service_name)?,
            port_label: self.port_label.clone(),
            container_port: self.container_port,
            image: quote(&params.image)?,
            has_args: !params.args.is_empty(),
            args: quote_list(&params.args)?,
            env: params
                .env
                .iter()
                .map(|(k, v)| Ok((quote(k)?, quote(v)?)))
                .collect::<SpecResult<_>>()?,
            memory_mb: params.resources.memory_mb,
            cpu_mhz: params.resources.cpu_mhz,
            volume,
        };

        let hcl = template
            .render()
            .map_err(|e| SpecError::Render(e.to_string()))?;
        debug!(job_id = %identity.job_id, bytes = hcl.len(), "job spec rendered");
        Ok(JobSpec {
            job_id: identity.job_id.clone(),
            hcl,
        })
    }
}

fn volume_view(mount: &VolumeMount) -> SpecResult<VolumeView> {
    let kind = mount.kind.as_str();
    if mount.destination.trim().is_empty() {
        return Err(ValidationError::MissingVolumeField {
            kind,
            field: "destination_path",
        }
        .into());
    }
    if mount.source.trim().is_empty() {
        let field = match mount.kind {
            MountKind::Csi => "volume_id",
            MountKind::Host => "source_path",
        };
        return Err(ValidationError::MissingVolumeField { kind, field }.into());
    }
    Ok(VolumeView {
        kind,
        csi: mount.kind == MountKind::Csi,
        source: quote(&mount.source)?,
        destination: quote(&mount.destination)?,
    })
}

/// Quote a string as an HCL literal.
///
/// JSON string escapes are valid HCL; template sequences are escaped on
/// top so user values are never interpolated.
fn quote(value: &str) -> SpecResult<String> {
    let quoted = serde_json::to_string(value).map_err(|e| SpecError::Render(e.to_string()))?;
    Ok(quoted.replace("${", "$${").replace("%{", "%%{"))
}

fn quote_list(values: &[String]) -> SpecResult<String> {
    let items = values
        .iter()
        .map(|v| quote(v))
        .collect::<SpecResult<Vec<_>>>()?;
    Ok(format!("[{}]", items.join(", ")))
}
