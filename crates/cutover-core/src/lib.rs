pub mod config;
pub mod types;

pub use config::{ConfigError, CutoverConfig, EnvSettings};
pub use types::*;
