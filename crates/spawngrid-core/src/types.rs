//! Domain types for workload provisioning.
//!
//! `WorkloadIdentity` is the only durable record; everything else is
//! either an input to `start` or recomputed from the scheduler on demand.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ── Identity ──────────────────────────────────────────────────────

/// Durable identity of a provisioned workload.
///
/// Written after a job is submitted, read back before `poll`/`stop` on a
/// revived session, cleared on `stop`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadIdentity {
    /// Truncated hash of the tenant/session key.
    pub workload_id: String,
    /// Scheduler job ID.
    pub job_id: String,
    /// Scheduler job name.
    pub job_name: String,
    /// Service name the workload registers under.
    pub service_name: String,
}

// ── Parameters ────────────────────────────────────────────────────

/// Resource limits for the workload's task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resources {
    /// Memory in megabytes.
    pub memory_mb: u64,
    /// CPU shares in MHz. The scheduler default applies when unset.
    #[serde(default)]
    pub cpu_mhz: Option<u32>,
}

/// Everything `start` needs to provision a workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadParams {
    /// Owning tenant (user name).
    pub tenant: String,
    /// Session name within the tenant; empty for the default session.
    #[serde(default)]
    pub session: String,
    /// Container image.
    pub image: String,
    pub resources: Resources,
    /// Datacenters the job may be placed in.
    pub datacenters: Vec<String>,
    #[serde(default)]
    pub volume: VolumeRequest,
    /// Environment passed to the task.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Arguments passed to the task's entrypoint.
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkloadParams {
    /// Stable key the workload ID is derived from.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.tenant, self.session)
    }

    /// Check that the parameters describe a buildable workload.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.image.trim().is_empty() {
            return Err(ValidationError::EmptyImage);
        }
        if self.datacenters.is_empty() {
            return Err(ValidationError::NoDatacenters);
        }
        if self.resources.memory_mb == 0 {
            return Err(ValidationError::ZeroMemory);
        }
        self.volume.validate()
    }
}

// ── Volumes ───────────────────────────────────────────────────────

/// Requested storage for a workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum VolumeRequest {
    #[default]
    None,
    /// A CSI volume created through `plugin_id`, scoped to the workload.
    DynamicProvisioned {
        destination_path: String,
        plugin_id: String,
    },
    /// A host directory that already exists on the client node.
    HostMounted {
        destination_path: String,
        source_path: String,
    },
}

impl VolumeRequest {
    pub fn is_none(&self) -> bool {
        matches!(self, VolumeRequest::None)
    }

    /// Check required sub-fields for the requested kind.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            VolumeRequest::None => Ok(()),
            VolumeRequest::DynamicProvisioned {
                destination_path,
                plugin_id,
            } => {
                require("csi", "destination_path", destination_path)?;
                require("csi", "plugin_id", plugin_id)
            }
            VolumeRequest::HostMounted {
                destination_path,
                source_path,
            } => {
                require("host", "destination_path", destination_path)?;
                require("host", "source_path", source_path)
            }
        }
    }
}

fn require(kind: &'static str, field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingVolumeField { kind, field })
    } else {
        Ok(())
    }
}

/// How a resolved volume is attached to the task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MountKind {
    Csi,
    Host,
}

impl MountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountKind::Csi => "csi",
            MountKind::Host => "host",
        }
    }
}

/// A volume reference ready to be placed in a job spec.
///
/// For CSI mounts `source` is the derived volume ID; for host mounts it
/// is the host volume name the caller supplied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeMount {
    pub kind: MountKind,
    pub source: String,
    pub destination: String,
}

// ── Status ────────────────────────────────────────────────────────

/// Coarse projection of the scheduler's view of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Starting,
    Running,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Starting => "starting",
            JobStatus::Running => "running",
            JobStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Endpoint ──────────────────────────────────────────────────────

/// Reachable address of a running workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}
