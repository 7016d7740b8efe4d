//! Host lifecycle management for ForgeFlow
//!
//! Coordinates the application definition, the configuration generators
//! and the external tools to create, configure and tear down application
//! hosts. See [`host::Host`] for the lifecycle contract.

pub mod error;
pub mod host;

pub use error::{HostError, Result};
pub use host::{ApplicationSource, Host, HostOptions, ToolPrograms};
