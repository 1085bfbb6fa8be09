//! spawngrid-core — shared types for provisioning per-user workloads.
//!
//! Everything here is pure: no I/O beyond reading a config file, no
//! async. The scheduler, registry, state, and lifecycle crates all build
//! on these types.

pub mod config;
pub mod error;
pub mod identity;
pub mod options;
pub mod types;

pub use config::{
    PolicySettings, PollSettings, RegistryProvider, RegistrySettings, ResolveSettings,
    SchedulerSettings, SpawnerConfig, StateSettings, StopSettings, TlsSettings,
};
pub use error::ValidationError;
pub use identity::{derive_workload_id, job_id_for, service_name_for, volume_id_for};
pub use options::{SpawnPolicy, UserOptions};
pub use types::*;
