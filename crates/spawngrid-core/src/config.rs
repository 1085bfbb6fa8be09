//! spawngrid.toml configuration parser.
//!
//! Every section is optional; missing values fall back to defaults that
//! point at a local scheduler and registry. After parsing, the standard
//! `NOMAD_*` / `CONSUL_*` environment variables are overlaid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpawnerConfig {
    pub scheduler: SchedulerSettings,
    pub registry: RegistrySettings,
    pub poll: PollSettings,
    pub resolve: ResolveSettings,
    pub stop: StopSettings,
    pub policy: PolicySettings,
    pub state: StateSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    pub address: String,
    pub token: Option<String>,
    pub namespace: String,
    pub tls: TlsSettings,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            address: "http://localhost:4646".to_string(),
            token: None,
            namespace: "default".to_string(),
            tls: TlsSettings::default(),
        }
    }
}

/// Which backend answers service lookups.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistryProvider {
    #[default]
    Consul,
    /// The scheduler's own service catalog.
    Nomad,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistrySettings {
    pub provider: RegistryProvider,
    pub address: String,
    pub token: Option<String>,
    pub tls: TlsSettings,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            provider: RegistryProvider::Consul,
            address: "http://localhost:8500".to_string(),
            token: None,
            tls: TlsSettings::default(),
        }
    }
}

/// TLS material for one backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TlsSettings {
    /// PEM bundle of trusted CAs.
    pub ca_cert: Option<PathBuf>,
    /// Directory of PEM files with trusted CAs.
    pub ca_path: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    /// Accept any server certificate.
    pub skip_verify: bool,
    /// Name to verify the server certificate against instead of the host.
    pub tls_server_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollSettings {
    /// Seconds between job status checks while waiting for `running`.
    pub interval_secs: u64,
    /// Give up waiting after this many seconds. Unset waits indefinitely.
    pub max_wait_secs: Option<u64>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            max_wait_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResolveSettings {
    pub delay_secs: u64,
    pub max_attempts: u32,
}

impl Default for ResolveSettings {
    fn default() -> Self {
        Self {
            delay_secs: 3,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StopSettings {
    /// Purge the job from the scheduler instead of just stopping it.
    pub purge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicySettings {
    pub datacenters: Vec<String>,
    pub common_images: Vec<String>,
    pub csi_plugin_ids: Vec<String>,
    pub memory_limit_mb: Option<u64>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            datacenters: vec!["dc1".to_string()],
            common_images: vec![
                "jupyter/base-notebook".to_string(),
                "jupyter/scipy-notebook".to_string(),
                "jupyter/datascience-notebook".to_string(),
                "jupyter/tensorflow-notebook".to_string(),
                "jupyter/minimal-notebook".to_string(),
            ],
            csi_plugin_ids: Vec::new(),
            memory_limit_mb: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StateSettings {
    /// redb file holding session identities.
    pub path: PathBuf,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/spawngrid/sessions.redb"),
        }
    }
}

impl SpawnerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SpawnerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Overlay the process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Overlay variables from `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = var("NOMAD_ADDR") {
            self.scheduler.address = v;
        }
        if let Some(v) = var("NOMAD_TOKEN") {
            self.scheduler.token = Some(v);
        }
        if let Some(v) = var("NOMAD_NAMESPACE") {
            self.scheduler.namespace = v;
        }
        overlay_tls(&mut self.scheduler.tls, "NOMAD", &var);

        if let Some(v) = var("CONSUL_HTTP_ADDR") {
            self.registry.address = v;
        }
        if let Some(v) = var("CONSUL_HTTP_TOKEN") {
            self.registry.token = Some(v);
        }
        overlay_tls(&mut self.registry.tls, "CONSUL", &var);
    }
}

fn overlay_tls<F>(tls: &mut TlsSettings, prefix: &str, var: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = var(&format!("{prefix}_CA_CERT")) {
        tls.ca_cert = Some(PathBuf::from(v));
    }
    if let Some(v) = var(&format!("{prefix}_CA_PATH")) {
        tls.ca_path = Some(PathBuf::from(v));
    }
    if let Some(v) = var(&format!("{prefix}_CLIENT_CERT")) {
        tls.client_cert = Some(PathBuf::from(v));
    }
    if let Some(v) = var(&format!("{prefix}_CLIENT_KEY")) {
        tls.client_key = Some(PathBuf::from(v));
    }
    if let Some(v) = var(&format!("{prefix}_TLS_SERVER_NAME")) {
        tls.tls_server_name = Some(v);
    }
    if let Some(v) = var(&format!("{prefix}_TLS_SKIP_VERIFY")) {
        tls.skip_verify = parse_flag(&v);
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "yes" | "true" | "t" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_localhost() {
        let config = SpawnerConfig::default();
        assert_eq!(config.scheduler.address, "http://localhost:4646");
        assert_eq!(config.registry.address, "http://localhost:8500");
        assert_eq!(config.scheduler.namespace, "default");
        assert_eq!(config.poll.interval_secs, 5);
        assert_eq!(config.poll.max_wait_secs, None);
        assert_eq!(config.resolve.delay_secs, 3);
        assert_eq!(config.resolve.max_attempts, 5);
        assert!(!config.stop.purge);
    }

    #[test]
    fn parse_minimal() {
        let config: SpawnerConfig = toml::from_str(
            r#"
[scheduler]
address = "https://nomad.internal:4646"
namespace = "notebooks"
"#,
        )
        .unwrap();
        assert_eq!(config.scheduler.address, "https://nomad.internal:4646");
        assert_eq!(config.scheduler.namespace, "notebooks");
        assert_eq!(config.registry.address, "http://localhost:8500");
    }

    #[test]
    fn parse_full_tls_and_policy() {
        let config: SpawnerConfig = toml::from_str(
            r#"
[scheduler.tls]
ca_cert = "/etc/nomad/ca.pem"
client_cert = "/etc/nomad/cli.pem"
client_key = "/etc/nomad/cli-key.pem"
tls_server_name = "server.global.nomad"

[registry]
provider = "nomad"

[poll]
max_wait_secs = 600

[policy]
datacenters = ["dc1", "dc2"]
csi_plugin_ids = ["plugin-x"]
memory_limit_mb = 4096
"#,
        )
        .unwrap();
        assert!(config.scheduler.tls.client_cert.is_some());
        assert!(config.scheduler.tls.client_key.is_some());
        assert_eq!(
            config.scheduler.tls.tls_server_name.as_deref(),
            Some("server.global.nomad")
        );
        assert_eq!(config.registry.provider, RegistryProvider::Nomad);
        assert_eq!(config.poll.max_wait_secs, Some(600));
        assert_eq!(config.policy.memory_limit_mb, Some(4096));
        assert_eq!(config.policy.csi_plugin_ids, vec!["plugin-x"]);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = SpawnerConfig::default();
        config.apply_env(env(&[
            ("NOMAD_ADDR", "https://nomad:4646"),
            ("NOMAD_TOKEN", "secret"),
            ("NOMAD_CLIENT_KEY", "/k.pem"),
            ("NOMAD_TLS_SKIP_VERIFY", "Yes"),
            ("CONSUL_HTTP_ADDR", "https://consul:8501"),
            ("CONSUL_CA_PATH", "/etc/consul/ca.d"),
        ]));
        assert_eq!(config.scheduler.address, "https://nomad:4646");
        assert_eq!(config.scheduler.token.as_deref(), Some("secret"));
        assert_eq!(config.scheduler.tls.client_key, Some(PathBuf::from("/k.pem")));
        assert!(config.scheduler.tls.skip_verify);
        assert!(config.scheduler.tls.client_cert.is_none());
        assert_eq!(config.registry.address, "https://consul:8501");
        assert_eq!(
            config.registry.tls.ca_path,
            Some(PathBuf::from("/etc/consul/ca.d"))
        );
        assert!(!config.registry.tls.skip_verify);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = SpawnerConfig::default();
        config.apply_env(env(&[("NOMAD_ADDR", ""), ("NOMAD_TOKEN", "")]));
        assert_eq!(config.scheduler.address, "http://localhost:4646");
        assert!(config.scheduler.token.is_none());
    }

    #[test]
    fn skip_verify_flag_spellings() {
        for yes in ["yes", "TRUE", "t", "1"] {
            assert!(parse_flag(yes), "{yes}");
        }
        for no in ["no", "0", "false", "off"] {
            assert!(!parse_flag(no), "{no}");
        }
    }

    #[test]
    fn from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spawngrid.toml");
        let mut config = SpawnerConfig::default();
        config.scheduler.namespace = "notebooks".to_string();
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = SpawnerConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
