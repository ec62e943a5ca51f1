//! The swap orchestrator.
//!
//! Drives one blue/green deployment end to end: resolve the active
//! slot, fetch the artifact, launch the target, gate on health,
//! switch traffic, monitor stability, then finalize or roll back.
//! Every mutating stage pushes a compensating action; any later
//! failure unwinds the stack in reverse so the system always exits in
//! a known-good state.

pub mod compensation;
pub mod error;
pub mod orchestrator;
pub mod phase;
pub mod resolver;

pub use error::{SwapError, SwapFailure};
pub use orchestrator::Swap;
pub use phase::SwapPhase;
