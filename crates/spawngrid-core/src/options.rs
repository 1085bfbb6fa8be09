//! User-selected options and the policy that admits them.
//!
//! The front-end submits a flat form (`image`, `datacenters`, `memory`,
//! `volume_*`). `SpawnPolicy` checks it against what the operator allows
//! and turns it into `WorkloadParams`.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::PolicySettings;
use crate::error::ValidationError;
use crate::types::{Resources, VolumeRequest, WorkloadParams};

/// Options chosen by the user for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UserOptions {
    pub image: String,
    pub datacenters: Vec<String>,
    pub memory_mb: u64,
    /// `""`/`none`, `csi`, or `host`.
    #[serde(default)]
    pub volume_type: String,
    #[serde(default)]
    pub volume_source: Option<String>,
    #[serde(default)]
    pub volume_destination: Option<String>,
    #[serde(default)]
    pub volume_csi_plugin_id: Option<String>,
}

impl UserOptions {
    /// Read options from multi-valued form data.
    pub fn from_form(form: &HashMap<String, Vec<String>>) -> Result<Self, ValidationError> {
        let first = |key: &str| form.get(key).and_then(|v| v.first()).cloned();

        let memory = first("memory").unwrap_or_default();
        let memory_mb = memory
            .trim()
            .parse::<u64>()
            .map_err(|e| ValidationError::InvalidOption {
                field: "memory",
                reason: format!("{memory:?}: {e}"),
            })?;

        Ok(Self {
            image: first("image").unwrap_or_default(),
            datacenters: form.get("datacenters").cloned().unwrap_or_default(),
            memory_mb,
            volume_type: first("volume_type").unwrap_or_default(),
            volume_source: first("volume_source"),
            volume_destination: first("volume_destination"),
            volume_csi_plugin_id: first("volume_csi_plugin_id"),
        })
    }

    /// Map the flat volume fields to a `VolumeRequest`.
    pub fn volume_request(&self) -> Result<VolumeRequest, ValidationError> {
        let destination = self.volume_destination.clone().unwrap_or_default();
        match self.volume_type.as_str() {
            "" | "none" => Ok(VolumeRequest::None),
            "csi" => Ok(VolumeRequest::DynamicProvisioned {
                destination_path: destination,
                plugin_id: self.volume_csi_plugin_id.clone().unwrap_or_default(),
            }),
            "host" => Ok(VolumeRequest::HostMounted {
                destination_path: destination,
                source_path: self.volume_source.clone().unwrap_or_default(),
            }),
            other => Err(ValidationError::UnknownVolumeType(other.to_string())),
        }
    }
}

/// Operator limits on what users may request.
#[derive(Debug, Clone, Default)]
pub struct SpawnPolicy {
    pub datacenters: Vec<String>,
    /// Images offered to users; the first one is used when none is chosen.
    pub common_images: Vec<String>,
    pub csi_plugin_ids: Vec<String>,
    pub memory_limit_mb: Option<u64>,
}

impl From<&PolicySettings> for SpawnPolicy {
    fn from(settings: &PolicySettings) -> Self {
        Self {
            datacenters: settings.datacenters.clone(),
            common_images: settings.common_images.clone(),
            csi_plugin_ids: settings.csi_plugin_ids.clone(),
            memory_limit_mb: settings.memory_limit_mb,
        }
    }
}

impl SpawnPolicy {
    /// Admit user options and build the parameters for `start`.
    pub fn admit(
        &self,
        tenant: &str,
        session: &str,
        options: &UserOptions,
        env: BTreeMap<String, String>,
        args: Vec<String>,
    ) -> Result<WorkloadParams, ValidationError> {
        if let Some(limit) = self.memory_limit_mb {
            if limit <= options.memory_mb {
                return Err(ValidationError::MemoryLimitExceeded {
                    requested: options.memory_mb,
                    limit,
                });
            }
        }

        if !options
            .datacenters
            .iter()
            .all(|dc| self.datacenters.contains(dc))
        {
            return Err(ValidationError::DatacenterNotAllowed(
                options.datacenters.clone(),
            ));
        }

        let volume = options.volume_request()?;
        if let VolumeRequest::DynamicProvisioned { plugin_id, .. } = &volume {
            if !self.csi_plugin_ids.contains(plugin_id) {
                return Err(ValidationError::PluginNotAllowed(plugin_id.clone()));
            }
        }

        let image = match options.image.trim() {
            "" => self.common_images.first().cloned().unwrap_or_default(),
            chosen => chosen.to_string(),
        };

        let params = WorkloadParams {
            tenant: tenant.to_string(),
            session: session.to_string(),
            image,
            resources: Resources {
                memory_mb: options.memory_mb,
                cpu_mhz: None,
            },
            datacenters: options.datacenters.clone(),
            volume,
            env,
            args,
        };
        params.validate()?;
        Ok(params)
    }
}
