//! spawngrid-lifecycle — the per-session workload state machine.
//!
//! # Architecture
//!
//! ```text
//! start ─► Provisioning ─► AwaitingRunning ─► Resolving ─► Running
//!            │ create_volume    │ current_status    │ healthy_instances
//!            │ submit_job       │ every 5s          │ 3s apart, 5 tries
//!            ▼                  ▼                   ▼
//!          Failed ◄─────────────┴───────────────────┘
//!
//! stop (from any phase) ─► Stopping ─► Stopped   (identity cleared)
//! ```
//!
//! The orchestrator owns one `WorkloadIdentity`. It is recorded as soon
//! as the scheduler accepts the job, so a `start` that later fails can
//! still be torn down with `stop`.

pub mod error;
pub mod orchestrator;
pub mod phase;
pub mod policy;

pub use error::{LifecycleError, LifecycleResult};
pub use orchestrator::{CancelHandle, LifecycleOrchestrator, PollOutcome, StopOutcome};
pub use phase::LifecyclePhase;
pub use policy::{PollPolicy, ResolvePolicy};
