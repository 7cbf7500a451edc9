//! # Feature: Manifest Commands
//!
//! File-backed commands described by YAML manifests. Each manifest runs an
//! allowlisted CLI and posts its output back to Discord. Manifests under a
//! sub-directory of the commands root belong to the plugin of that name.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: true

pub mod command;
pub mod config;
pub mod executor;

pub use command::{ManifestCommand, ManifestLoader};
pub use config::{CommandManifest, ExecutionConfig, ManifestKind};
pub use executor::{ExecutionResult, PluginExecutor};
