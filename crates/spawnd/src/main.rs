//! spawnd — drive per-user workloads from the command line.
//!
//! Loads `SpawnerConfig` (TOML file plus `NOMAD_*` / `CONSUL_*`
//! environment), builds one scheduler client and one registry client,
//! and runs a single lifecycle operation per invocation. Workload
//! identities are kept in the redb session store so `poll` and `stop`
//! work across invocations.
//!
//! # Usage
//!
//! ```text
//! spawnd start --tenant alice --image jupyter/base-notebook --memory 512
//! spawnd poll --tenant alice
//! spawnd stop --tenant alice --delete-volume
//! ```

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use spawngrid_core::SpawnerConfig;

const DEFAULT_FILTER: &str = "info,spawnd=debug,spawngrid=debug";

#[derive(Parser, Debug)]
#[command(name = "spawnd", about = "spawngrid workload lifecycle CLI")]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone)]
struct SessionArgs {
    /// Owning tenant (user name).
    #[arg(long)]
    tenant: String,

    /// Session name; empty for the tenant's default session.
    #[arg(long, default_value = "")]
    session: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision a workload and wait until it is reachable.
    Start {
        #[command(flatten)]
        session: SessionArgs,

        /// Container image. Defaults to the first configured common image.
        #[arg(long)]
        image: Option<String>,

        /// Datacenter the job may run in (repeatable).
        #[arg(long = "datacenter", default_value = "dc1")]
        datacenters: Vec<String>,

        /// Memory in MB.
        #[arg(long)]
        memory: u64,

        /// `none`, `csi` or `host`.
        #[arg(long, default_value = "none")]
        volume_type: String,

        /// Host volume name (host volumes).
        #[arg(long)]
        volume_source: Option<String>,

        /// Mount path inside the task.
        #[arg(long)]
        volume_destination: Option<String>,

        /// CSI plugin ID (csi volumes).
        #[arg(long)]
        csi_plugin_id: Option<String>,

        /// Task environment entry, `KEY=VALUE` (repeatable).
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        /// Arguments passed to the task's entrypoint.
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Check whether a session's workload is running.
    Poll {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Stop a session's workload.
    Stop {
        #[command(flatten)]
        session: SessionArgs,

        /// Also delete the session's dynamic volume.
        #[arg(long)]
        delete_volume: bool,
    },

    /// List known sessions.
    Sessions,

    /// Delete a dynamic volume by ID.
    VolumeDelete {
        #[arg(long)]
        volume_id: String,
    },

    /// Print the effective configuration as TOML.
    Config,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SpawnerConfig> {
    let mut config = match path {
        Some(path) => SpawnerConfig::from_file(path)?,
        None => SpawnerConfig::default(),
    };
    config.apply_process_env();
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Start {
            session,
            image,
            datacenters,
            memory,
            volume_type,
            volume_source,
            volume_destination,
            csi_plugin_id,
            env,
            args,
        } => {
            let options = spawngrid_core::UserOptions {
                image: image.unwrap_or_default(),
                datacenters,
                memory_mb: memory,
                volume_type,
                volume_source,
                volume_destination,
                volume_csi_plugin_id: csi_plugin_id,
            };
            commands::start(
                &config,
                &session.tenant,
                &session.session,
                &options,
                env.into_iter().collect(),
                args,
            )
            .await
        }
        Command::Poll { session } => commands::poll(&config, &session.tenant, &session.session).await,
        Command::Stop {
            session,
            delete_volume,
        } => commands::stop(&config, &session.tenant, &session.session, delete_volume).await,
        Command::Sessions => commands::sessions(&config).await,
        Command::VolumeDelete { volume_id } => commands::volume_delete(&config, &volume_id).await,
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
