//! Podman/docker CLI driver.
//!
//! Podman is preferred when both are installed (rootless by default);
//! docker is the fallback. All operations shell out to the detected
//! binary and map non-zero exits to typed errors carrying stderr.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::RuntimeError;
use crate::{ContainerRuntime, RunSpec};

/// Which container CLI is driving operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Podman,
    Docker,
}

impl RuntimeKind {
    pub fn command(self) -> &'static str {
        match self {
            RuntimeKind::Podman => "podman",
            RuntimeKind::Docker => "docker",
        }
    }
}

/// The real container runtime, backed by the podman or docker CLI.
#[derive(Debug, Clone)]
pub struct ContainerCli {
    kind: RuntimeKind,
}

impl ContainerCli {
    /// Detect an available runtime, preferring podman.
    pub fn detect() -> Result<Self, RuntimeError> {
        for kind in [RuntimeKind::Podman, RuntimeKind::Docker] {
            let found = std::process::Command::new(kind.command())
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok_and(|status| status.success());
            if found {
                debug!(runtime = kind.command(), "container runtime detected");
                return Ok(Self { kind });
            }
        }
        Err(RuntimeError::Unavailable)
    }

    pub fn with_kind(kind: RuntimeKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> RuntimeKind {
        self.kind
    }

    /// Run the CLI with `args`, returning (stdout, stderr) on success.
    async fn exec(&self, args: &[&str]) -> Result<(String, String), RuntimeError> {
        let output = Command::new(self.kind.command())
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok((stdout, stderr))
        } else {
            Err(RuntimeError::CommandFailed {
                command: format!("{} {}", self.kind.command(), args.join(" ")),
                reason: stderr.trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl ContainerRuntime for ContainerCli {
    async fn list_running(&self, names: &[String]) -> Result<Vec<String>, RuntimeError> {
        let (stdout, _) = self.exec(&["ps", "--format", "{{.Names}}"]).await?;
        let running: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|line| names.iter().any(|name| name == line))
            .map(String::from)
            .collect();
        debug!(?running, "queried running instances");
        Ok(running)
    }

    async fn login(
        &self,
        registry: &str,
        username: &str,
        password: &str,
    ) -> Result<(), RuntimeError> {
        let mut child = Command::new(self.kind.command())
            .args(["login", "--username", username, "--password-stdin", registry])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(password.as_bytes()).await?;
            // Dropping stdin closes the pipe so the CLI stops reading.
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            info!(registry, "registry login succeeded");
            Ok(())
        } else {
            Err(RuntimeError::Auth {
                registry: registry.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        info!(image, "pulling image");
        match self.exec(&["pull", image]).await {
            Ok(_) => Ok(()),
            Err(RuntimeError::CommandFailed { reason, .. }) => {
                Err(classify_pull_error(image, &reason))
            }
            Err(other) => Err(other),
        }
    }

    async fn run(&self, spec: &RunSpec) -> Result<(), RuntimeError> {
        let args = run_args(spec);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        info!(name = %spec.name, image = %spec.image, port = spec.host_port, "starting instance");
        match self.exec(&arg_refs).await {
            Ok(_) => Ok(()),
            Err(RuntimeError::CommandFailed { reason, .. }) => Err(RuntimeError::StartFailed {
                name: spec.name.clone(),
                reason,
            }),
            Err(other) => Err(other),
        }
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        match self.exec(&["rm", "-f", name]).await {
            Ok(_) => {
                info!(name, "instance removed");
                Ok(())
            }
            // Removing a nonexistent instance is a success for retry safety.
            Err(RuntimeError::CommandFailed { reason, .. })
                if reason.to_lowercase().contains("no such container") =>
            {
                debug!(name, "instance already absent");
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    async fn logs(&self, name: &str, tail: u32) -> Result<String, RuntimeError> {
        let tail = tail.to_string();
        let output = Command::new(self.kind.command())
            .args(["logs", "--tail", &tail, name])
            .stdin(Stdio::null())
            .output()
            .await?;
        // Container stdout and stderr both matter for diagnostics.
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }
}

/// Build the `run` argument vector for a spec.
fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "-p".to_string(),
        format!("{}:{}", spec.host_port, spec.container_port),
    ];
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    for volume in &spec.volumes {
        args.push("-v".to_string());
        args.push(volume.clone());
    }
    if let Some(log_driver) = &spec.log_driver {
        args.push("--log-driver".to_string());
        args.push(log_driver.driver.clone());
        for (key, value) in &log_driver.options {
            args.push("--log-opt".to_string());
            args.push(format!("{key}={value}"));
        }
    }
    args.push(spec.image.clone());
    args
}

/// Distinguish a missing image from other pull failures.
fn classify_pull_error(image: &str, stderr: &str) -> RuntimeError {
    let lowered = stderr.to_lowercase();
    let missing = ["not found", "manifest unknown", "does not exist", "name unknown"]
        .iter()
        .any(|needle| lowered.contains(needle));
    if missing {
        RuntimeError::ImageNotFound {
            image: image.to_string(),
            reason: stderr.to_string(),
        }
    } else {
        RuntimeError::PullFailed {
            image: image.to_string(),
            reason: stderr.to_string(),
        }
    }
}
