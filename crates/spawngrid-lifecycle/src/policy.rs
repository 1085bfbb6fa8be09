//! Timing policies for the wait and resolve loops.

use std::time::Duration;

use spawngrid_core::{PollSettings, ResolveSettings};

/// How often to check job status while waiting for `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` waits indefinitely.
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_wait: None,
        }
    }
}

impl From<&PollSettings> for PollPolicy {
    fn from(settings: &PollSettings) -> Self {
        Self {
            // Never spin on the scheduler.
            interval: Duration::from_secs(settings.interval_secs.max(1)),
            max_wait: settings.max_wait_secs.map(Duration::from_secs),
        }
    }
}

/// Fixed-delay retry for service resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvePolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            max_attempts: 5,
        }
    }
}

impl From<&ResolveSettings> for ResolvePolicy {
    fn from(settings: &ResolveSettings) -> Self {
        Self {
            delay: Duration::from_secs(settings.delay_secs),
            // At least one lookup always happens.
            max_attempts: settings.max_attempts.max(1),
        }
    }
}
