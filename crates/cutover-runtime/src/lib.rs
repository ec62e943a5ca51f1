//! Container runtime seam.
//!
//! The orchestrator only ever talks to the runtime through the
//! [`ContainerRuntime`] trait; [`ContainerCli`] is the real
//! implementation driving the podman or docker CLI.

pub mod cli;
pub mod error;

pub use cli::{ContainerCli, RuntimeKind};
pub use error::RuntimeError;

use async_trait::async_trait;
use cutover_core::config::LogDriverConfig;

/// Specification for launching one container instance.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Instance name, also used for later lookup and removal.
    pub name: String,
    /// Fully qualified image reference.
    pub image: String,
    /// Host port to bind.
    pub host_port: u16,
    /// Port the service listens on inside the container.
    pub container_port: u16,
    /// Environment variables for the instance.
    pub env: Vec<(String, String)>,
    /// Volume bindings (`host:container` form).
    pub volumes: Vec<String>,
    /// Log-driver wiring, passed through unvalidated.
    pub log_driver: Option<LogDriverConfig>,
}

/// Operations the orchestrator needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Which of `names` currently have a running instance.
    async fn list_running(&self, names: &[String]) -> Result<Vec<String>, RuntimeError>;

    /// Authenticate against an image registry.
    async fn login(
        &self,
        registry: &str,
        username: &str,
        password: &str,
    ) -> Result<(), RuntimeError>;

    /// Pull an image by reference.
    async fn pull(&self, image: &str) -> Result<(), RuntimeError>;

    /// Start an instance. The caller is responsible for removing any
    /// stale instance under the same name first.
    async fn run(&self, spec: &RunSpec) -> Result<(), RuntimeError>;

    /// Force-remove an instance. Succeeds if it does not exist.
    async fn remove(&self, name: &str) -> Result<(), RuntimeError>;

    /// Capture the last `tail` log lines of an instance.
    async fn logs(&self, name: &str, tail: u32) -> Result<String, RuntimeError>;
}
