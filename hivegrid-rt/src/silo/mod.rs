//! Silo host: configuration and process-level wiring.

pub mod config;
#[allow(clippy::module_inception)]
pub mod silo;

pub use config::{SiloConfig, SiloConfigBuilder};
pub use silo::{Silo, SiloBuilder, SiloError};
