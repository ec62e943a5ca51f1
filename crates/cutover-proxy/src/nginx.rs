//! Nginx controller.
//!
//! Candidate configs are syntax-checked against a staging path before
//! the live file is touched. Applying snapshots the prior live bytes,
//! writes the candidate, and issues a single reload; if the reload
//! fails the prior bytes are written back so the live file never
//! disagrees with what the proxy is actually serving.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::routing::RoutingConfig;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("routing config failed validation: {0}")]
    Validation(String),

    #[error("proxy reload failed: {0}")]
    Reload(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Live file contents captured before a switch.
///
/// `None` means no live file existed (first deployment on a host).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingSnapshot {
    pub prior: Option<String>,
}

/// Operations the orchestrator needs from the routing layer.
#[async_trait]
pub trait ProxyController: Send + Sync {
    /// Syntax-check a candidate without touching the live config.
    async fn validate(&self, config: &RoutingConfig) -> Result<(), ProxyError>;

    /// Snapshot the live file, write the candidate, reload once.
    async fn apply(&self, config: &RoutingConfig) -> Result<RoutingSnapshot, ProxyError>;

    /// Write a snapshot back and reload.
    async fn restore(&self, snapshot: &RoutingSnapshot) -> Result<(), ProxyError>;

    /// Current live file contents, if any.
    async fn live_config(&self) -> Result<Option<String>, ProxyError>;
}

/// Real controller driving the nginx binary.
#[derive(Debug, Clone)]
pub struct NginxController {
    config_path: PathBuf,
    nginx_bin: String,
}

impl NginxController {
    pub fn new(config_path: PathBuf, nginx_bin: impl Into<String>) -> Self {
        Self {
            config_path,
            nginx_bin: nginx_bin.into(),
        }
    }

    fn staging_path(&self) -> PathBuf {
        let mut path = self.config_path.as_os_str().to_owned();
        path.push(".staged");
        PathBuf::from(path)
    }

    fn read_live(&self) -> Result<Option<String>, ProxyError> {
        match std::fs::read_to_string(&self.config_path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ProxyError::Io {
                path: self.config_path.display().to_string(),
                source,
            }),
        }
    }

    fn write_live(&self, text: &str) -> Result<(), ProxyError> {
        std::fs::write(&self.config_path, text).map_err(|source| ProxyError::Io {
            path: self.config_path.display().to_string(),
            source,
        })
    }

    async fn nginx(&self, args: &[&str]) -> Result<(), String> {
        let output = Command::new(&self.nginx_bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| e.to_string())?;
        if output.status.success() {
            Ok(())
        } else {
            // nginx writes diagnostics to stderr.
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }

    async fn reload(&self) -> Result<(), String> {
        let config = self.config_path.display().to_string();
        self.nginx(&["-c", &config, "-s", "reload"]).await
    }
}

#[async_trait]
impl ProxyController for NginxController {
    async fn validate(&self, config: &RoutingConfig) -> Result<(), ProxyError> {
        let staging = self.staging_path();
        std::fs::write(&staging, config.text()).map_err(|source| ProxyError::Io {
            path: staging.display().to_string(),
            source,
        })?;

        let staged = staging.display().to_string();
        let result = self.nginx(&["-t", "-c", &staged]).await;
        if let Err(e) = std::fs::remove_file(&staging) {
            warn!(path = %staged, error = %e, "failed to remove staged config");
        }

        match result {
            Ok(()) => {
                debug!(port = config.upstream_port(), "routing config validated");
                Ok(())
            }
            Err(reason) => Err(ProxyError::Validation(reason)),
        }
    }

    async fn apply(&self, config: &RoutingConfig) -> Result<RoutingSnapshot, ProxyError> {
        let prior = self.read_live()?;
        self.write_live(config.text())?;

        if let Err(reason) = self.reload().await {
            // Put the old bytes back so the file matches what the
            // proxy is still serving.
            match &prior {
                Some(text) => self.write_live(text)?,
                None => {
                    if let Err(e) = std::fs::remove_file(&self.config_path) {
                        warn!(error = %e, "failed to remove written config after reload failure");
                    }
                }
            }
            return Err(ProxyError::Reload(reason));
        }

        info!(
            port = config.upstream_port(),
            path = %self.config_path.display(),
            "routing switched"
        );
        Ok(RoutingSnapshot { prior })
    }

    async fn restore(&self, snapshot: &RoutingSnapshot) -> Result<(), ProxyError> {
        match &snapshot.prior {
            Some(text) => self.write_live(text)?,
            None => {
                if let Err(e) = std::fs::remove_file(&self.config_path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        return Err(ProxyError::Io {
                            path: self.config_path.display().to_string(),
                            source: e,
                        });
                    }
                }
            }
        }

        self.reload().await.map_err(ProxyError::Reload)?;
        info!("routing restored to pre-switch snapshot");
        Ok(())
    }

    async fn live_config(&self) -> Result<Option<String>, ProxyError> {
        self.read_live()
    }
}
