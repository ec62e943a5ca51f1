//! Compensating actions.
//!
//! Each mutating stage pushes its undo as it succeeds: launch pushes
//! remove-instance, switch pushes restore-routing. On any later
//! failure the stack unwinds in reverse order, which returns the
//! system to its exact pre-deployment state. After a confirmed-stable
//! deployment the stack is discarded without running.

use tracing::{info, warn};

use cutover_proxy::{ProxyController, RoutingSnapshot};
use cutover_runtime::ContainerRuntime;

/// One undo operation paired with a forward action.
#[derive(Debug, Clone)]
pub enum Compensation {
    /// Remove the target instance created by the launcher.
    RemoveInstance { name: String },
    /// Restore the pre-switch routing snapshot.
    RestoreRouting { snapshot: RoutingSnapshot },
}

/// Undo actions for the current run, executed in reverse on failure.
#[derive(Debug, Default)]
pub struct CompensationStack {
    actions: Vec<Compensation>,
}

impl CompensationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Compensation) {
        self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Discard all actions without executing them.
    pub fn discard(&mut self) {
        self.actions.clear();
    }

    /// Execute all actions in reverse order.
    ///
    /// Every action is attempted even if an earlier one fails; the
    /// collected failures are returned so the caller can escalate.
    pub async fn unwind<R, P>(&mut self, runtime: &R, proxy: &P) -> Result<(), Vec<String>>
    where
        R: ContainerRuntime + ?Sized,
        P: ProxyController + ?Sized,
    {
        let mut failures = Vec::new();

        while let Some(action) = self.actions.pop() {
            match action {
                Compensation::RemoveInstance { name } => {
                    info!(%name, "rollback: removing target instance");
                    if let Err(e) = runtime.remove(&name).await {
                        warn!(%name, error = %e, "rollback step failed");
                        failures.push(format!("remove instance '{name}': {e}"));
                    }
                }
                Compensation::RestoreRouting { snapshot } => {
                    info!("rollback: restoring pre-switch routing");
                    if let Err(e) = proxy.restore(&snapshot).await {
                        warn!(error = %e, "rollback step failed");
                        failures.push(format!("restore routing: {e}"));
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}
