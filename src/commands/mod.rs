//! # Command System
//!
//! Registry, lifecycle, hot reload, and dispatch for slash and context-menu
//! commands.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod builtin;
pub mod context;
pub mod descriptor;
pub mod dispatcher;
pub mod export;
pub mod platform;
pub mod registry;
pub mod watcher;

pub use builtin::builtin_commands;
pub use context::{CommandContext, ContextKind, ReplyTarget};
pub use descriptor::{
    CommandArgs, CommandDescriptor, CommandHandler, CommandKind, CommandState, OptionKind,
    OptionSpec,
};
pub use dispatcher::{DispatchOutcome, Dispatcher, InteractionRequest};
pub use export::{build_export, CommandSpec, CommandUploader, UploadTarget};
pub use registry::{CommandLoader, CommandRegistry, ImportSummary};
pub use watcher::{CommandWatcher, FileEvent};
