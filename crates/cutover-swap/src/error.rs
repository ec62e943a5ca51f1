//! Error taxonomy for the swap pipeline.
//!
//! Each variant corresponds to a stage and implies a cleanup scope:
//! nothing (no mutation yet), remove-target, or restore-routing plus
//! remove-target. `RollbackFailed` means the cleanup itself failed
//! and the system may be inconsistent — operator intervention.

use std::fmt;

use thiserror::Error;

use cutover_proxy::ProxyError;
use cutover_runtime::RuntimeError;

use crate::phase::SwapPhase;

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("ambiguous slot state: {0}")]
    AmbiguousState(String),

    #[error("registry authentication failed: {0}")]
    Authentication(String),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("failed to launch target instance: {0}")]
    Launch(String),

    #[error("target never reported healthy within {attempts} attempts")]
    HealthCheckTimeout { attempts: u32 },

    #[error("routing config failed validation: {0}")]
    RoutingValidation(String),

    #[error("post-switch health check failed through the live route: {0}")]
    PostSwitchHealth(String),

    #[error("final verification failed after soak: {0}")]
    FinalVerification(String),

    #[error("rollback failed, manual intervention required: {0}")]
    RollbackFailed(String),

    #[error("deployment deadline of {0}s exceeded")]
    DeadlineExceeded(u64),

    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),
}

/// A failed run: the stage it died in, the error, and any captured
/// diagnostics (target instance logs on health failures).
#[derive(Debug)]
pub struct SwapFailure {
    pub phase: SwapPhase,
    pub error: SwapError,
    pub diagnostics: Option<String>,
}

impl fmt::Display for SwapFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deployment failed during {}: {}", self.phase, self.error)
    }
}

impl std::error::Error for SwapFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
