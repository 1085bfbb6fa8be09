//! One function per subcommand.
//!
//! The session store is a single redb file locked by whoever has it open,
//! so commands hold it only around reads and writes, never across a
//! scheduler call.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::{debug, info, warn};

use spawngrid_core::{RegistryProvider, SpawnPolicy, SpawnerConfig, UserOptions};
use spawngrid_lifecycle::{LifecycleOrchestrator, LifecyclePhase, PollOutcome};
use spawngrid_registry::{ConsulRegistry, RegistryClient};
use spawngrid_scheduler::{NomadClient, SchedulerClient};
use spawngrid_state::{SessionRecord, SessionStore};

/// Retry budget for a store briefly held by another command.
const STORE_OPEN_ATTEMPTS: u32 = 50;
const STORE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Build the scheduler and registry clients named by `config`.
fn clients(
    config: &SpawnerConfig,
) -> anyhow::Result<(Arc<dyn SchedulerClient>, Arc<dyn RegistryClient>)> {
    let nomad = Arc::new(
        NomadClient::from_settings(&config.scheduler).context("building scheduler client")?,
    );
    let registry: Arc<dyn RegistryClient> = match config.registry.provider {
        RegistryProvider::Consul => Arc::new(
            ConsulRegistry::from_settings(&config.registry).context("building registry client")?,
        ),
        RegistryProvider::Nomad => nomad.clone(),
    };
    let scheduler: Arc<dyn SchedulerClient> = nomad;
    Ok((scheduler, registry))
}

fn orchestrator(config: &SpawnerConfig) -> anyhow::Result<LifecycleOrchestrator> {
    let (scheduler, registry) = clients(config)?;
    Ok(LifecycleOrchestrator::from_config(scheduler, registry, config))
}

async fn open_store(config: &SpawnerConfig) -> anyhow::Result<SessionStore> {
    let path = &config.state.path;
    let mut attempt = 1;
    loop {
        match SessionStore::open(path) {
            Ok(store) => return Ok(store),
            Err(e) if e.is_busy() && attempt < STORE_OPEN_ATTEMPTS => {
                debug!(path = %path.display(), attempt, "session store busy, retrying");
                attempt += 1;
                tokio::time::sleep(STORE_RETRY_DELAY).await;
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("opening session store {}", path.display()));
            }
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub async fn start(
    config: &SpawnerConfig,
    tenant: &str,
    session: &str,
    options: &UserOptions,
    env: BTreeMap<String, String>,
    args: Vec<String>,
) -> anyhow::Result<()> {
    start_until(config, tenant, session, options, env, args, interrupted()).await
}

/// `start`, cancelled when `interrupt` resolves.
async fn start_until(
    config: &SpawnerConfig,
    tenant: &str,
    session: &str,
    options: &UserOptions,
    env: BTreeMap<String, String>,
    args: Vec<String>,
    interrupt: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let policy = SpawnPolicy::from(&config.policy);
    let params = policy.admit(tenant, session, options, env, args)?;

    let mut record = open_store(config)
        .await?
        .get_session(tenant, session)?
        .unwrap_or_else(|| SessionRecord::new(tenant, session));
    if let Some(identity) = &record.identity {
        bail!(
            "session {} already owns job {}; stop it first",
            record.table_key(),
            identity.job_id
        );
    }

    let mut orch = orchestrator(config)?;

    let cancel = orch.cancel_handle();
    let watcher = tokio::spawn(async move {
        interrupt.await;
        warn!("interrupted, cancelling start");
        cancel.cancel();
    });

    let result = orch.start(&params).await;
    watcher.abort();

    // Whatever got provisioned is recorded so `stop` can find it.
    record.identity = orch.identity().cloned();
    if let Some(volume_id) = orch.volume_id() {
        record.volume_id = Some(volume_id.to_string());
    }
    record.phase = orch.phase().to_string();
    open_store(config).await?.put_session(&record)?;

    let endpoint = result?;
    info!(session = %record.table_key(), %endpoint, "session started");
    println!("{endpoint}");
    Ok(())
}

pub async fn poll(config: &SpawnerConfig, tenant: &str, session: &str) -> anyhow::Result<()> {
    let record = open_store(config)
        .await?
        .get_session(tenant, session)?
        .with_context(|| format!("no session {tenant}/{session}"))?;
    let Some(identity) = record.identity else {
        bail!("session {tenant}/{session} has no running workload");
    };

    let mut orch = orchestrator(config)?;
    orch.resume(identity, record.volume_id)?;

    match orch.poll().await {
        PollOutcome::Healthy => {
            println!("running");
            Ok(())
        }
        PollOutcome::Unhealthy(status) => bail!("workload not running: {status}"),
        PollOutcome::Error(reason) => bail!("poll failed: {reason}"),
    }
}

/// Stop the session's job. The record is kept while it still names a
/// volume and removed once nothing is left to clean up.
pub async fn stop(
    config: &SpawnerConfig,
    tenant: &str,
    session: &str,
    delete_volume: bool,
) -> anyhow::Result<()> {
    let Some(record) = open_store(config).await?.get_session(tenant, session)? else {
        info!(%tenant, %session, "no such session; nothing stopped");
        return Ok(());
    };

    let mut orch = orchestrator(config)?;
    if let Some(identity) = record.identity.clone() {
        orch.resume(identity, record.volume_id.clone())?;
    }

    let outcome = orch.stop().await;
    if let Some(reason) = &outcome.remote_error {
        warn!(%tenant, %session, %reason, "job delete failed; identity cleared anyway");
    }

    let mut volume_id = record.volume_id.clone();
    if delete_volume {
        if let Some(id) = volume_id.clone() {
            match orch.delete_volume(&id).await {
                Ok(()) => volume_id = None,
                Err(e) => warn!(volume_id = %id, error = %e, "failed to delete volume"),
            }
        }
    }

    let store = open_store(config).await?;
    match volume_id {
        Some(_) => store.clear_identity(tenant, session, LifecyclePhase::Stopped.as_str())?,
        None => {
            store.delete_session(tenant, session)?;
        }
    }
    println!("stopped");
    Ok(())
}

pub async fn sessions(config: &SpawnerConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    for record in store.list_sessions()? {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

pub async fn volume_delete(config: &SpawnerConfig, volume_id: &str) -> anyhow::Result<()> {
    let orch = orchestrator(config)?;
    orch.delete_volume(volume_id)
        .await
        .with_context(|| format!("deleting volume {volume_id}"))?;
    println!("deleted {volume_id}");
    Ok(())
}
