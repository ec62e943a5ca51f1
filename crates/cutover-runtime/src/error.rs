//! Error types for container runtime operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no container runtime available; install podman or docker")]
    Unavailable,

    #[error("registry login to '{registry}' failed: {reason}")]
    Auth { registry: String, reason: String },

    #[error("image '{image}' not found: {reason}")]
    ImageNotFound { image: String, reason: String },

    #[error("failed to pull image '{image}': {reason}")]
    PullFailed { image: String, reason: String },

    #[error("failed to start instance '{name}': {reason}")]
    StartFailed { name: String, reason: String },

    #[error("'{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
