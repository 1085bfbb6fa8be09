//! Scheduler API payloads.
//!
//! Field names follow the Nomad HTTP API (PascalCase, with a few
//! all-caps acronyms). Only the fields spawngrid reads are modelled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Jobs ───────────────────────────────────────────────────────────

/// `POST /v1/jobs/parse` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobsParseRequest<'a> {
    #[serde(rename = "JobHCL")]
    pub job_hcl: &'a str,
    pub canonicalize: bool,
}

/// `POST /v1/jobs` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobRegisterRequest {
    pub enforce_index: bool,
    pub preserve_counts: bool,
    pub policy_override: bool,
    pub job_modify_index: u64,
    pub job: serde_json::Value,
}

impl JobRegisterRequest {
    /// Register a freshly parsed job without index checks.
    pub fn new(job: serde_json::Value) -> Self {
        Self {
            enforce_index: false,
            preserve_counts: true,
            policy_override: false,
            job_modify_index: 0,
            job,
        }
    }
}

/// The subset of `GET /v1/job/{id}` spawngrid reads.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct JobDocument {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// `pending`, `running` or `dead`.
    #[serde(default)]
    pub status: String,
}

/// Identity the scheduler assigned on submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub job_id: String,
    pub job_name: String,
}

// ── Allocations ────────────────────────────────────────────────────

/// One allocation of a job (`GET /v1/job/{id}/allocations`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Allocation {
    #[serde(rename = "ID")]
    pub id: String,
    /// Nanoseconds since the epoch.
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub task_states: Option<BTreeMap<String, TaskState>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    /// `pending`, `running` or `dead`.
    pub state: String,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub events: Option<Vec<TaskEvent>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct TaskEvent {
    #[serde(rename = "Type")]
    pub event_type: String,
    #[serde(default)]
    pub display_message: String,
}

/// `GET /v1/allocation/{id}`, network part only.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocationDetail {
    pub resources: AllocationResources,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocationResources {
    /// Nomad sends `null` rather than `[]` when there are none.
    #[serde(default)]
    pub networks: Option<Vec<NetworkResource>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkResource {
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(default)]
    pub dynamic_ports: Option<Vec<PortMapping>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortMapping {
    #[serde(default)]
    pub label: String,
    pub value: u16,
}

// ── Services ───────────────────────────────────────────────────────

/// One entry of `GET /v1/service/{name}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    pub address: String,
    pub port: u16,
}

// ── CSI volumes ────────────────────────────────────────────────────

pub const ATTACHMENT_MODE: &str = "file-system";
pub const ACCESS_MODE: &str = "single-node-writer";

/// `PUT /v1/volume/csi/{id}/create` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CsiVolumeCreateRequest {
    pub volumes: Vec<CsiVolume>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CsiVolume {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(rename = "ExternalID")]
    pub external_id: String,
    pub attachment_mode: &'static str,
    pub access_mode: &'static str,
    #[serde(rename = "PluginID")]
    pub plugin_id: String,
    pub requested_capabilities: Vec<CsiVolumeCapability>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CsiVolumeCapability {
    pub attachment_mode: &'static str,
    pub access_mode: &'static str,
}

impl CsiVolumeCreateRequest {
    /// A single-writer filesystem volume named after its ID.
    pub fn single(volume_id: &str, plugin_id: &str) -> Self {
        Self {
            volumes: vec![CsiVolume {
                id: volume_id.to_string(),
                name: volume_id.to_string(),
                external_id: volume_id.to_string(),
                attachment_mode: ATTACHMENT_MODE,
                access_mode: ACCESS_MODE,
                plugin_id: plugin_id.to_string(),
                requested_capabilities: vec![CsiVolumeCapability {
                    attachment_mode: ATTACHMENT_MODE,
                    access_mode: ACCESS_MODE,
                }],
            }],
        }
    }
}
