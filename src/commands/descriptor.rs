//! Command descriptors and their lifecycle
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! A descriptor couples static command metadata with the [`CommandHandler`]
//! that executes it. The registry drives the lifecycle:
//! `Unloaded -> Loading -> Loaded -> Destroying -> Destroyed`.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use super::context::CommandContext;

/// Which platform interaction triggers a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    Slash,
    UserContextMenu,
    ChatContextMenu,
}

impl CommandKind {
    pub const ALL: [CommandKind; 3] = [
        CommandKind::Slash,
        CommandKind::UserContextMenu,
        CommandKind::ChatContextMenu,
    ];

    /// Numeric application command type used on the wire
    pub fn wire_type(self) -> u8 {
        match self {
            CommandKind::Slash => 1,
            CommandKind::UserContextMenu => 2,
            CommandKind::ChatContextMenu => 3,
        }
    }

    pub fn from_wire_type(value: u8) -> Option<Self> {
        match value {
            1 => Some(CommandKind::Slash),
            2 => Some(CommandKind::UserContextMenu),
            3 => Some(CommandKind::ChatContextMenu),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CommandKind::Slash => "slash",
            CommandKind::UserContextMenu => "user",
            CommandKind::ChatContextMenu => "message",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle state of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandState {
    Unloaded = 0,
    Loading = 1,
    Loaded = 2,
    Destroying = 3,
    Destroyed = 4,
}

impl CommandState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CommandState::Loading,
            2 => CommandState::Loaded,
            3 => CommandState::Destroying,
            4 => CommandState::Destroyed,
            _ => CommandState::Unloaded,
        }
    }
}

/// Option value type, mirroring Discord's application command option types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    SubCommand,
    SubCommandGroup,
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
    Number,
    Attachment,
}

impl OptionKind {
    pub fn wire_type(self) -> u8 {
        match self {
            OptionKind::SubCommand => 1,
            OptionKind::SubCommandGroup => 2,
            OptionKind::String => 3,
            OptionKind::Integer => 4,
            OptionKind::Boolean => 5,
            OptionKind::User => 6,
            OptionKind::Channel => 7,
            OptionKind::Role => 8,
            OptionKind::Mentionable => 9,
            OptionKind::Number => 10,
            OptionKind::Attachment => 11,
        }
    }

    /// Parse a manifest type name; unknown names fall back to `String`
    pub fn parse(type_str: &str) -> Self {
        match type_str.to_lowercase().as_str() {
            "integer" => OptionKind::Integer,
            "boolean" => OptionKind::Boolean,
            "user" => OptionKind::User,
            "channel" => OptionKind::Channel,
            "role" => OptionKind::Role,
            "mentionable" => OptionKind::Mentionable,
            "number" => OptionKind::Number,
            "attachment" => OptionKind::Attachment,
            _ => OptionKind::String,
        }
    }
}

/// A predefined choice for an option
#[derive(Debug, Clone, PartialEq)]
pub struct OptionChoice {
    pub name: String,
    pub value: String,
}

/// Declared option of a command
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    pub required: bool,
    pub choices: Vec<OptionChoice>,
}

impl OptionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required: false,
            choices: Vec::new(),
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// Arguments bound for one invocation (option name -> value)
pub type CommandArgs = HashMap<String, String>;

/// Executable behavior behind a descriptor
///
/// `on_load` and `on_destroy` are the lifecycle hooks the registry awaits when
/// a command enters or leaves service. They must not call back into the
/// registry that owns the descriptor.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, ctx: &mut CommandContext, args: &CommandArgs) -> Result<()>;

    async fn on_load(&self) -> Result<()> {
        Ok(())
    }

    async fn on_destroy(&self) -> Result<()> {
        Ok(())
    }
}

/// Identity of a descriptor inside the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandKey {
    pub kind: CommandKind,
    pub name: String,
}

impl CommandKey {
    pub fn new(kind: CommandKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Metadata and behavior for one invocable command
pub struct CommandDescriptor {
    pub name: String,
    pub kind: CommandKind,
    pub description: String,
    pub options: Vec<OptionSpec>,
    pub group: Option<String>,
    pub dependencies: BTreeSet<String>,
    owning_plugin: Option<String>,
    source: Option<PathBuf>,
    state: AtomicU8,
    handler: Arc<dyn CommandHandler>,
}

impl CommandDescriptor {
    pub fn new(
        name: impl Into<String>,
        kind: CommandKind,
        description: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            options: Vec::new(),
            group: None,
            dependencies: BTreeSet::new(),
            owning_plugin: None,
            source: None,
            state: AtomicU8::new(CommandState::Unloaded as u8),
            handler,
        }
    }

    pub fn with_options(mut self, options: Vec<OptionSpec>) -> Self {
        self.options = options;
        self
    }

    /// Attach a sub-command group; ignored for context-menu kinds
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        if self.kind == CommandKind::Slash && !group.is_empty() {
            self.group = Some(group);
        }
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.owning_plugin = Some(plugin.into());
        self
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn key(&self) -> CommandKey {
        CommandKey::new(self.kind, self.name.clone())
    }

    /// `kind + name`, unique across the registry at any instant
    pub fn unique_id(&self) -> String {
        self.key().to_string()
    }

    pub fn owning_plugin(&self) -> Option<&str> {
        self.owning_plugin.as_deref()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn state(&self) -> CommandState {
        CommandState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == CommandState::Loaded
    }

    fn set_state(&self, state: CommandState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move `from -> to` atomically; false if the descriptor was elsewhere
    fn transition(&self, from: CommandState, to: CommandState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Run the load hook. `available_plugins` must cover every dependency.
    pub async fn load(&self, available_plugins: &BTreeSet<String>) -> Result<()> {
        if !self.transition(CommandState::Unloaded, CommandState::Loading) {
            return Err(anyhow::anyhow!(
                "Cannot load {} from state {:?}",
                self.unique_id(),
                self.state()
            ));
        }

        let missing: Vec<&str> = self
            .dependencies
            .iter()
            .filter(|dep| !available_plugins.contains(*dep))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            self.set_state(CommandState::Unloaded);
            return Err(anyhow::anyhow!(
                "{} requires unavailable plugin(s): {}",
                self.unique_id(),
                missing.join(", ")
            ));
        }

        match self.handler.on_load().await {
            Ok(()) => {
                self.set_state(CommandState::Loaded);
                Ok(())
            }
            Err(e) => {
                self.set_state(CommandState::Unloaded);
                Err(e)
            }
        }
    }

    /// Run the destroy hook. Fails without side effects if already destroying.
    pub async fn destroy(&self) -> Result<()> {
        let previous = self.state();
        if matches!(previous, CommandState::Destroying | CommandState::Destroyed) {
            return Err(anyhow::anyhow!(
                "{} is already {:?}",
                self.unique_id(),
                previous
            ));
        }
        if !self.transition(previous, CommandState::Destroying) {
            return Err(anyhow::anyhow!(
                "{} changed state during destroy",
                self.unique_id()
            ));
        }

        let result = self.handler.on_destroy().await;
        self.set_state(CommandState::Destroyed);
        result
    }

    pub async fn execute(&self, ctx: &mut CommandContext, args: &CommandArgs) -> Result<()> {
        self.handler.execute(ctx, args).await
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("group", &self.group)
            .field("owning_plugin", &self.owning_plugin)
            .field("source", &self.source)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Handler double that journals lifecycle hooks
    pub(crate) struct Journaled {
        pub label: String,
        pub journal: Arc<Mutex<Vec<String>>>,
        pub fail_load: bool,
        pub fail_destroy: bool,
    }

    impl Journaled {
        pub(crate) fn new(label: &str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                label: label.to_string(),
                journal: Arc::clone(journal),
                fail_load: false,
                fail_destroy: false,
            }
        }

        fn push(&self, entry: String) {
            self.journal.lock().unwrap().push(entry);
        }
    }

    #[async_trait]
    impl CommandHandler for Journaled {
        async fn execute(&self, ctx: &mut CommandContext, _args: &CommandArgs) -> Result<()> {
            self.push(format!("execute:{}", self.label));
            ctx.reply(&self.label).await
        }

        async fn on_load(&self) -> Result<()> {
            tokio::task::yield_now().await;
            if self.fail_load {
                return Err(anyhow::anyhow!("load failed"));
            }
            self.push(format!("load:{}", self.label));
            Ok(())
        }

        async fn on_destroy(&self) -> Result<()> {
            tokio::task::yield_now().await;
            if self.fail_destroy {
                return Err(anyhow::anyhow!("destroy failed"));
            }
            self.push(format!("destroy:{}", self.label));
            Ok(())
        }
    }

    fn descriptor(journal: &Arc<Mutex<Vec<String>>>) -> CommandDescriptor {
        CommandDescriptor::new(
            "ping",
            CommandKind::Slash,
            "Ping",
            Arc::new(Journaled::new("ping", journal)),
        )
    }

    #[test]
    fn test_unique_id_combines_kind_and_name() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let slash = descriptor(&journal);
        let menu = CommandDescriptor::new(
            "ping",
            CommandKind::UserContextMenu,
            "",
            Arc::new(Journaled::new("menu", &journal)),
        );
        assert_eq!(slash.unique_id(), "slash:ping");
        assert_ne!(slash.unique_id(), menu.unique_id());
    }

    #[test]
    fn test_group_ignored_for_context_menu() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let menu = CommandDescriptor::new(
            "report",
            CommandKind::UserContextMenu,
            "",
            Arc::new(Journaled::new("report", &journal)),
        )
        .with_group("mod");
        assert!(menu.group.is_none());
        assert_eq!(descriptor(&journal).with_group("").group, None);
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let cmd = descriptor(&journal);
        assert_eq!(cmd.state(), CommandState::Unloaded);

        cmd.load(&BTreeSet::new()).await.unwrap();
        assert_eq!(cmd.state(), CommandState::Loaded);

        cmd.destroy().await.unwrap();
        assert_eq!(cmd.state(), CommandState::Destroyed);
        assert!(cmd.destroy().await.is_err());

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["load:ping".to_string(), "destroy:ping".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_dependency_blocks_load() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let cmd = descriptor(&journal).with_dependencies(["music"]);

        assert!(cmd.load(&BTreeSet::new()).await.is_err());
        assert_eq!(cmd.state(), CommandState::Unloaded);
        assert!(journal.lock().unwrap().is_empty());

        let available: BTreeSet<String> = ["music".to_string()].into_iter().collect();
        cmd.load(&available).await.unwrap();
        assert!(cmd.is_loaded());
    }

    #[test]
    fn test_option_kind_parse() {
        assert_eq!(OptionKind::parse("STRING"), OptionKind::String);
        assert_eq!(OptionKind::parse("integer"), OptionKind::Integer);
        assert_eq!(OptionKind::parse("attachment"), OptionKind::Attachment);
        assert_eq!(OptionKind::parse("unknown"), OptionKind::String);
        assert_eq!(OptionKind::SubCommand.wire_type(), 1);
        assert_eq!(OptionKind::Number.wire_type(), 10);
    }

    #[test]
    fn test_kind_wire_roundtrip() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_wire_type(kind.wire_type()), Some(kind));
        }
        assert_eq!(CommandKind::from_wire_type(9), None);
    }
}
