//! cutover.toml configuration parser and environment overrides.
//!
//! Static layout (slot ports, retry policy, proxy paths) lives in
//! `cutover.toml`; addresses and credentials come from the
//! environment so CI can inject them without touching the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Slot;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CutoverConfig {
    pub service: ServiceConfig,
    pub slots: SlotsConfig,
    pub health: HealthGateConfig,
    pub monitor: MonitorConfig,
    pub proxy: ProxyConfig,
    /// Wall-clock cap on a whole deployment run, in seconds.
    /// 0 disables the cap.
    pub deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Instance name prefix; slots become `<name>-a` / `<name>-b`.
    pub name: String,
    /// Image repository path, without registry host or tag.
    pub image: String,
    /// Port the service listens on inside the container.
    pub container_port: u16,
    /// Health endpoint path served by the instance.
    pub health_path: String,
    /// Log-driver name and options passed to the runtime, if any.
    pub log_driver: Option<LogDriverConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogDriverConfig {
    pub driver: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotsConfig {
    pub port_a: u16,
    pub port_b: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthGateConfig {
    /// Delay before the first probe, in seconds.
    pub warmup_secs: u64,
    /// Maximum probe attempts before giving up.
    pub attempts: u32,
    /// Fixed delay between attempts, in seconds.
    pub interval_secs: u64,
    /// Per-probe timeout, in seconds.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Post-switch confirmation attempts through the proxy path.
    pub confirm_attempts: u32,
    pub confirm_interval_secs: u64,
    /// Observation window after the switch before the old slot is
    /// discarded, in seconds.
    pub soak_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Live site file the proxy loads.
    pub config_path: PathBuf,
    /// Port the proxy listens on for primary traffic.
    pub listen_port: u16,
    /// Restricted metrics path.
    pub metrics_path: String,
    /// Source addresses allowed on the metrics path.
    pub metrics_allow: Vec<String>,
    /// Proxy binary used for syntax checks and reloads.
    pub nginx_bin: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "inference".to_string(),
            image: "inference-api".to_string(),
            container_port: 5000,
            health_path: "/health".to_string(),
            log_driver: None,
        }
    }
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            port_a: 9001,
            port_b: 9002,
        }
    }
}

impl Default for HealthGateConfig {
    fn default() -> Self {
        Self {
            warmup_secs: 10,
            attempts: 20,
            interval_secs: 15,
            timeout_secs: 5,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            confirm_attempts: 5,
            confirm_interval_secs: 10,
            soak_secs: 60,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/etc/nginx/conf.d/inference.conf"),
            listen_port: 8080,
            metrics_path: "/metrics".to_string(),
            metrics_allow: vec!["127.0.0.1".to_string()],
            nginx_bin: "nginx".to_string(),
        }
    }
}

impl CutoverConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.is_file() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Host port owned by a slot.
    pub fn slot_port(&self, slot: Slot) -> u16 {
        match slot {
            Slot::A => self.slots.port_a,
            Slot::B => self.slots.port_b,
        }
    }

    /// Container instance name for a slot.
    pub fn instance_name(&self, slot: Slot) -> String {
        format!("{}-{}", self.service.name, slot)
    }
}

impl Default for CutoverConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            slots: SlotsConfig::default(),
            health: HealthGateConfig::default(),
            monitor: MonitorConfig::default(),
            proxy: ProxyConfig::default(),
            deadline_secs: 1800,
        }
    }
}

/// Addresses and credentials supplied by the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvSettings {
    pub region: Option<String>,
    pub registry: Option<String>,
    pub registry_user: Option<String>,
    pub registry_password: Option<String>,
    pub tracking_uri: Option<String>,
    pub tracking_user: Option<String>,
    pub tracking_password: Option<String>,
    pub notify_url: Option<String>,
}

impl EnvSettings {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            region: var("AWS_REGION"),
            registry: var("CUTOVER_REGISTRY"),
            registry_user: var("CUTOVER_REGISTRY_USER"),
            registry_password: var("CUTOVER_REGISTRY_PASSWORD"),
            tracking_uri: var("MLFLOW_TRACKING_URI"),
            tracking_user: var("MLFLOW_TRACKING_USERNAME"),
            tracking_password: var("MLFLOW_TRACKING_PASSWORD"),
            notify_url: var("CUTOVER_NOTIFY_URL"),
        }
    }

    /// Fully qualified image reference for an artifact tag.
    pub fn image_ref(&self, image: &str, artifact: &str) -> String {
        match &self.registry {
            Some(registry) => format!("{registry}/{image}:{artifact}"),
            None => format!("{image}:{artifact}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CutoverConfig::default();
        assert_eq!(config.slots.port_a, 9001);
        assert_eq!(config.slots.port_b, 9002);
        assert_ne!(
            config.slot_port(Slot::A),
            config.slot_port(Slot::B),
            "slots must never share a port"
        );
        assert_eq!(config.health.attempts, 20);
        assert_eq!(config.health.interval_secs, 15);
        assert_eq!(config.instance_name(Slot::A), "inference-a");
    }

    #[test]
    fn parse_minimal() {
        let config: CutoverConfig = toml::from_str(
            r#"
[service]
name = "water-quality"
image = "water-quality-api"
"#,
        )
        .unwrap();
        assert_eq!(config.service.name, "water-quality");
        assert_eq!(config.instance_name(Slot::B), "water-quality-b");
        // Unspecified sections fall back to defaults.
        assert_eq!(config.health.attempts, 20);
    }

    #[test]
    fn parse_overrides() {
        let config: CutoverConfig = toml::from_str(
            r#"
deadline_secs = 600

[slots]
port_a = 7001
port_b = 7002

[health]
attempts = 3
interval_secs = 1
warmup_secs = 0

[proxy]
listen_port = 80
metrics_allow = ["10.0.0.0/8"]
"#,
        )
        .unwrap();
        assert_eq!(config.deadline_secs, 600);
        assert_eq!(config.slot_port(Slot::A), 7001);
        assert_eq!(config.health.attempts, 3);
        assert_eq!(config.proxy.listen_port, 80);
        assert_eq!(config.proxy.metrics_allow, vec!["10.0.0.0/8"]);
    }

    #[test]
    fn parse_log_driver() {
        let config: CutoverConfig = toml::from_str(
            r#"
[service.log_driver]
driver = "awslogs"

[service.log_driver.options]
awslogs-group = "/inference/service"
"#,
        )
        .unwrap();
        let log_driver = config.service.log_driver.unwrap();
        assert_eq!(log_driver.driver, "awslogs");
        assert_eq!(
            log_driver.options.get("awslogs-group").map(String::as_str),
            Some("/inference/service")
        );
    }

    #[test]
    fn image_ref_with_and_without_registry() {
        let mut env = EnvSettings::default();
        assert_eq!(env.image_ref("api", "v2"), "api:v2");

        env.registry = Some("123456789.dkr.ecr.eu-west-1.amazonaws.com".to_string());
        assert_eq!(
            env.image_ref("api", "v2"),
            "123456789.dkr.ecr.eu-west-1.amazonaws.com/api:v2"
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = CutoverConfig::load_or_default(Path::new("/nonexistent/cutover.toml")).unwrap();
        assert_eq!(config.service.name, "inference");
    }
}
