// Core layer - configuration and reply shaping
pub mod core;

// Command layer - registry, hot reload, dispatch
pub mod commands;

// Features layer - manifest-backed commands
pub mod features;

pub use core::Config;

pub use commands::{CommandDescriptor, CommandKind, CommandRegistry, Dispatcher};
pub use features::{ManifestLoader, PluginExecutor};
