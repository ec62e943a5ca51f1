//! Active-slot resolution.
//!
//! The "which slot is active" fact is never cached in-process; every
//! run queries the container runtime fresh. Zero or two running slot
//! instances means the system needs manual intervention and the
//! orchestrator must not guess.

use tracing::info;

use cutover_core::{CutoverConfig, Slot};
use cutover_runtime::ContainerRuntime;

use crate::error::SwapError;

/// Determine which slot currently serves traffic.
pub async fn resolve_active<R>(runtime: &R, config: &CutoverConfig) -> Result<Slot, SwapError>
where
    R: ContainerRuntime + ?Sized,
{
    let names: Vec<String> = Slot::both()
        .iter()
        .map(|slot| config.instance_name(*slot))
        .collect();
    let running = runtime.list_running(&names).await?;

    let a_running = running.contains(&names[0]);
    let b_running = running.contains(&names[1]);

    match (a_running, b_running) {
        (true, false) => {
            info!(active = %Slot::A, "resolved active slot");
            Ok(Slot::A)
        }
        (false, true) => {
            info!(active = %Slot::B, "resolved active slot");
            Ok(Slot::B)
        }
        (false, false) => Err(SwapError::AmbiguousState(format!(
            "neither '{}' nor '{}' has a running instance",
            names[0], names[1]
        ))),
        (true, true) => Err(SwapError::AmbiguousState(format!(
            "both '{}' and '{}' have running instances",
            names[0], names[1]
        ))),
    }
}
