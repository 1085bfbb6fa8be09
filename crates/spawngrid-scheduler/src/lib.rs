//! spawngrid-scheduler — talking to the cluster scheduler.
//!
//! - `SchedulerClient`: the async seam the lifecycle orchestrator drives
//!   (volumes, job submit/delete, status, service lookup).
//! - `NomadClient`: implementation over the Nomad HTTP API. It also
//!   implements `RegistryClient` over Nomad's native service catalog.
//! - `WorkloadSpecBuilder`: renders the job HCL from workload parameters.
//! - `derive_status`: folds allocation task states into a `JobStatus`.

pub mod client;
pub mod error;
pub mod jobspec;
pub mod models;
pub mod nomad;
pub mod status;

pub use client::SchedulerClient;
pub use error::{SpecError, SpecResult};
pub use jobspec::{JobSpec, WorkloadSpecBuilder};
pub use models::{Allocation, JobDocument, SubmittedJob, TaskEvent, TaskState};
pub use nomad::NomadClient;
pub use status::derive_status;
