//! Shared types used across Cutover crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two fixed deployment slots.
///
/// A slot owns a fixed instance name and host port. Exactly one slot
/// serves live traffic at steady state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// The opposite slot.
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::A => "a",
            Slot::B => "b",
        }
    }

    /// Both slots, in label order.
    pub fn both() -> [Slot; 2] {
        [Slot::A, Slot::B]
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a slot is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Serving live traffic through the proxy.
    Active,
    /// Idle, no instance expected.
    Standby,
    /// Being deployed to in the current run.
    Target,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Active => "active",
            Role::Standby => "standby",
            Role::Target => "target",
        };
        f.write_str(s)
    }
}

/// A slot together with its resolved runtime identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub slot: Slot,
    /// Container instance name (`<service>-<slot>`).
    pub instance: String,
    /// Host port the instance is bound to.
    pub port: u16,
    pub role: Role,
}

/// A single deployment request. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    /// Image tag or digest to deploy.
    pub artifact: String,
    /// Extra environment variables for the launched instance.
    pub extra_env: Vec<(String, String)>,
    /// Volume bindings (`host:container` form).
    pub volumes: Vec<String>,
}

impl DeploymentRequest {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            extra_env: Vec::new(),
            volumes: Vec::new(),
        }
    }
}

/// Terminal record of one deployment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOutcome {
    pub status: OutcomeStatus,
    /// Slot active after the run completed or rolled back. `None`
    /// when the run failed before the active slot could be resolved.
    pub active_after: Option<Slot>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    Failure,
}

impl DeploymentOutcome {
    pub fn success(active_after: Slot, reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            active_after: Some(active_after),
            reason: reason.into(),
        }
    }

    pub fn failure(active_after: Option<Slot>, reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            active_after,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}
