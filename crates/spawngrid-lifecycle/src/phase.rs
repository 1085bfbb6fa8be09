//! Orchestrator phases.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    NotStarted,
    Provisioning,
    AwaitingRunning,
    Resolving,
    Running,
    Stopping,
    Stopped,
    /// `start` failed. Only `stop` is accepted from here.
    Failed,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::NotStarted => "not_started",
            LifecyclePhase::Provisioning => "provisioning",
            LifecyclePhase::AwaitingRunning => "awaiting_running",
            LifecyclePhase::Resolving => "resolving",
            LifecyclePhase::Running => "running",
            LifecyclePhase::Stopping => "stopping",
            LifecyclePhase::Stopped => "stopped",
            LifecyclePhase::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
