//! External tool adapters for ForgeFlow
//!
//! Wraps the three provisioning tools behind a common invocation contract:
//!
//! - **terraform**: infrastructure provisioning (plan/apply/destroy/state)
//! - **packer**: host image building and manifest parsing
//! - **ansible**: host configuration playbook generation
//!
//! Each adapter is bound to a host configuration directory, assembles its
//! configuration from layered source files, and runs the tool as a
//! blocking subprocess with captured stderr.

pub mod ansible;
pub mod error;
pub mod packer;
pub mod process;
pub mod sources;
pub mod terraform;

pub use ansible::Ansible;
pub use error::{Result, ToolError};
pub use packer::Packer;
pub use process::{ExecOutput, RunOpts};
pub use terraform::Terraform;

use std::path::Path;

/// Read a JSON file
pub fn json_read(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|error| ToolError::Runtime(format!("Unable to read \"{}\": {error}", path.display())))
}

/// Write a JSON file
pub fn json_write(value: &serde_json::Value, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    Ok(())
}
