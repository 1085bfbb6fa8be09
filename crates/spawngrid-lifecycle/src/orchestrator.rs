//! LifecycleOrchestrator — provision, wait, resolve, run, tear down.
//!
//! One orchestrator drives one session. `start`, `stop` and `resume`
//! take `&mut self`, so a session cannot be driven re-entrantly; `poll`
//! only reads. Scheduler and registry clients are shared `Arc`s and may
//! serve any number of orchestrators.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use spawngrid_core::{
    JobStatus, MountKind, ServiceEndpoint, SpawnerConfig, VolumeMount, VolumeRequest,
    WorkloadIdentity, WorkloadParams, derive_workload_id, job_id_for, service_name_for,
    volume_id_for,
};
use spawngrid_registry::RegistryClient;
use spawngrid_scheduler::{SchedulerClient, WorkloadSpecBuilder};

use crate::error::{LifecycleError, LifecycleResult};
use crate::phase::LifecyclePhase;
use crate::policy::{PollPolicy, ResolvePolicy};

/// Result of a health poll. Remote failures are reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Healthy,
    Unhealthy(JobStatus),
    Error(String),
}

/// Acknowledgement returned by `stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    /// Job that was deleted, if a workload was known.
    pub job_id: Option<String>,
    /// Scheduler error from the delete call, if any. The identity is
    /// cleared either way.
    pub remote_error: Option<String>,
}

/// Cancels an in-flight `start` from another task.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Drives one workload through its lifecycle.
pub struct LifecycleOrchestrator {
    scheduler: Arc<dyn SchedulerClient>,
    registry: Arc<dyn RegistryClient>,
    builder: WorkloadSpecBuilder,
    poll_policy: PollPolicy,
    resolve_policy: ResolvePolicy,
    purge_on_stop: bool,
    identity: Option<WorkloadIdentity>,
    volume_id: Option<String>,
    phase: LifecyclePhase,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl LifecycleOrchestrator {
    pub fn new(scheduler: Arc<dyn SchedulerClient>, registry: Arc<dyn RegistryClient>) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            scheduler,
            registry,
            builder: WorkloadSpecBuilder::new(),
            poll_policy: PollPolicy::default(),
            resolve_policy: ResolvePolicy::default(),
            purge_on_stop: false,
            identity: None,
            volume_id: None,
            phase: LifecyclePhase::NotStarted,
            cancel_tx: Arc::new(cancel_tx),
        }
    }

    /// Build with poll, resolve and stop settings taken from `config`.
    pub fn from_config(
        scheduler: Arc<dyn SchedulerClient>,
        registry: Arc<dyn RegistryClient>,
        config: &SpawnerConfig,
    ) -> Self {
        Self::new(scheduler, registry)
            .with_poll_policy(PollPolicy::from(&config.poll))
            .with_resolve_policy(ResolvePolicy::from(&config.resolve))
            .with_purge_on_stop(config.stop.purge)
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    pub fn with_resolve_policy(mut self, policy: ResolvePolicy) -> Self {
        self.resolve_policy = policy;
        self
    }

    pub fn with_purge_on_stop(mut self, purge: bool) -> Self {
        self.purge_on_stop = purge;
        self
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn identity(&self) -> Option<&WorkloadIdentity> {
        self.identity.as_ref()
    }

    /// Dynamic volume created by `start`, if any. `stop` leaves it in place.
    pub fn volume_id(&self) -> Option<&str> {
        self.volume_id.as_deref()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    // ── start ──────────────────────────────────────────────────────

    /// Provision the workload and wait until it is reachable.
    ///
    /// Any failure leaves the orchestrator in `Failed`. Nothing is rolled
    /// back; call `stop` to delete a job that was already submitted.
    pub async fn start(&mut self, params: &WorkloadParams) -> LifecycleResult<ServiceEndpoint> {
        if self.identity.is_some() || self.phase != LifecyclePhase::NotStarted {
            return Err(LifecycleError::AlreadyStarted);
        }

        match self.run_start(params).await {
            Ok(endpoint) => {
                self.phase = LifecyclePhase::Running;
                info!(
                    tenant = %params.tenant,
                    session = %params.session,
                    %endpoint,
                    "workload running"
                );
                Ok(endpoint)
            }
            Err(e) => {
                warn!(
                    tenant = %params.tenant,
                    session = %params.session,
                    phase = %self.phase,
                    error = %e,
                    "failed to start workload"
                );
                self.phase = LifecyclePhase::Failed;
                Err(e)
            }
        }
    }

    async fn run_start(&mut self, params: &WorkloadParams) -> LifecycleResult<ServiceEndpoint> {
        self.phase = LifecyclePhase::Provisioning;
        params.validate()?;

        let workload_id = derive_workload_id(&params.session_key());
        let job_id = job_id_for(&workload_id);
        let planned = WorkloadIdentity {
            workload_id: workload_id.clone(),
            job_id: job_id.clone(),
            job_name: job_id.clone(),
            service_name: service_name_for(&job_id),
        };
        info!(%workload_id, %job_id, image = %params.image, "provisioning workload");

        let mount = match &params.volume {
            VolumeRequest::None => None,
            VolumeRequest::DynamicProvisioned {
                destination_path,
                plugin_id,
            } => {
                let volume_id = volume_id_for(&workload_id);
                self.scheduler.create_volume(&volume_id, plugin_id).await?;
                self.volume_id = Some(volume_id.clone());
                Some(VolumeMount {
                    kind: MountKind::Csi,
                    source: volume_id,
                    destination: destination_path.clone(),
                })
            }
            VolumeRequest::HostMounted {
                destination_path,
                source_path,
            } => Some(VolumeMount {
                kind: MountKind::Host,
                source: source_path.clone(),
                destination: destination_path.clone(),
            }),
        };

        let spec = self.builder.build(&planned, params, mount.as_ref())?;
        let submitted = self.scheduler.submit_job(&spec).await?;

        let identity = WorkloadIdentity {
            workload_id,
            service_name: service_name_for(&submitted.job_id),
            job_id: submitted.job_id,
            job_name: submitted.job_name,
        };
        self.identity = Some(identity.clone());
        debug!(job_id = %identity.job_id, "identity recorded");

        self.phase = LifecyclePhase::AwaitingRunning;
        self.await_running(&identity.job_id).await?;

        self.phase = LifecyclePhase::Resolving;
        self.resolve_endpoint(&identity.service_name).await
    }

    /// Poll job status until `running`.
    async fn await_running(&self, job_id: &str) -> LifecycleResult<()> {
        let started = Instant::now();
        let mut cancel = self.cancel_tx.subscribe();

        loop {
            if *cancel.borrow_and_update() {
                return Err(LifecycleError::Cancelled);
            }

            let status = tokio::select! {
                status = self.scheduler.current_status(job_id) => status,
                _ = cancel.changed() => return Err(LifecycleError::Cancelled),
            };
            match status {
                Ok(JobStatus::Running) => return Ok(()),
                Ok(JobStatus::Dead) => {
                    return Err(LifecycleError::WorkloadDead {
                        job_id: job_id.to_string(),
                    });
                }
                Ok(status) => info!(%job_id, %status, "waiting for job"),
                Err(e) => warn!(%job_id, error = %e, "failed to get job status"),
            }

            if let Some(max_wait) = self.poll_policy.max_wait {
                let waited = started.elapsed();
                if waited >= max_wait {
                    return Err(LifecycleError::Timeout {
                        job_id: job_id.to_string(),
                        waited,
                    });
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_policy.interval) => {}
                _ = cancel.changed() => return Err(LifecycleError::Cancelled),
            }
        }
    }

    /// Look the service up until exactly one healthy instance shows.
    async fn resolve_endpoint(&self, service: &str) -> LifecycleResult<ServiceEndpoint> {
        let attempts = self.resolve_policy.max_attempts.max(1);
        let mut cancel = self.cancel_tx.subscribe();

        for attempt in 1..=attempts {
            if *cancel.borrow_and_update() {
                return Err(LifecycleError::Cancelled);
            }

            let lookup = tokio::select! {
                lookup = self.registry.healthy_instances(service) => lookup,
                _ = cancel.changed() => return Err(LifecycleError::Cancelled),
            };
            match lookup {
                Ok(mut instances) => match instances.len() {
                    1 => return Ok(instances.remove(0).into()),
                    0 => debug!(%service, attempt, "service not registered yet"),
                    count => {
                        return Err(LifecycleError::AmbiguousService {
                            service: service.to_string(),
                            count,
                        });
                    }
                },
                Err(e) => warn!(%service, attempt, error = %e, "registry lookup failed"),
            }

            if attempt < attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.resolve_policy.delay) => {}
                    _ = cancel.changed() => return Err(LifecycleError::Cancelled),
                }
            }
        }

        Err(LifecycleError::ServiceNotFound {
            service: service.to_string(),
            attempts,
        })
    }

    // ── poll / stop / resume ───────────────────────────────────────

    /// Check whether the workload is still running.
    pub async fn poll(&self) -> PollOutcome {
        let Some(identity) = &self.identity else {
            return PollOutcome::Error(LifecycleError::NotStarted.to_string());
        };

        match self.scheduler.current_status(&identity.job_id).await {
            Ok(JobStatus::Running) => PollOutcome::Healthy,
            Ok(status) => {
                warn!(job_name = %identity.job_name, %status, "workload not running");
                PollOutcome::Unhealthy(status)
            }
            Err(e) => {
                warn!(job_id = %identity.job_id, error = %e, "failed to poll");
                PollOutcome::Error(e.to_string())
            }
        }
    }

    /// Delete the job and forget the identity.
    ///
    /// Accepted from every phase. Dynamic volumes are left alone.
    pub async fn stop(&mut self) -> StopOutcome {
        self.phase = LifecyclePhase::Stopping;

        let job_id = self.identity.take().map(|identity| identity.job_id);
        let mut remote_error = None;

        match &job_id {
            Some(job_id) => match self.scheduler.delete_job(job_id, self.purge_on_stop).await {
                Ok(()) => info!(%job_id, purge = self.purge_on_stop, "workload stopped"),
                Err(e) => {
                    warn!(%job_id, error = %e, "failed to delete job");
                    remote_error = Some(e.to_string());
                }
            },
            None => info!("no workload to stop"),
        }

        self.phase = LifecyclePhase::Stopped;
        StopOutcome {
            job_id,
            remote_error,
        }
    }

    /// Reinstall a persisted identity on a fresh orchestrator.
    pub fn resume(
        &mut self,
        identity: WorkloadIdentity,
        volume_id: Option<String>,
    ) -> LifecycleResult<()> {
        if self.identity.is_some() || self.phase != LifecyclePhase::NotStarted {
            return Err(LifecycleError::AlreadyStarted);
        }
        debug!(job_id = %identity.job_id, "identity resumed");
        self.identity = Some(identity);
        self.volume_id = volume_id;
        self.phase = LifecyclePhase::Running;
        Ok(())
    }

    /// Delete a dynamic volume left behind by a stopped workload.
    pub async fn delete_volume(&self, volume_id: &str) -> LifecycleResult<()> {
        self.scheduler.delete_volume(volume_id).await?;
        info!(%volume_id, "volume deleted");
        Ok(())
    }
}
