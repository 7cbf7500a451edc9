//! # Features Layer
//!
//! Optional capabilities layered on top of the command registry.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

pub mod plugins;

pub use plugins::{CommandManifest, ManifestCommand, ManifestLoader, PluginExecutor};
