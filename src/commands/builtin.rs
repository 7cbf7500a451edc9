//! Built-in command handlers
//!
//! Handles: ping, commands, Inspect User
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::sync::{Arc, Weak};
use tokio::time::Instant;

use super::context::CommandContext;
use super::descriptor::{CommandArgs, CommandDescriptor, CommandHandler, CommandKind};
use super::registry::CommandRegistry;
use crate::core::response::{split_reply, MESSAGE_LIMIT};

/// `/ping`: reply, then report the round-trip of that reply
pub struct PingCommand;

#[async_trait]
impl CommandHandler for PingCommand {
    async fn execute(&self, ctx: &mut CommandContext, _args: &CommandArgs) -> Result<()> {
        let started = Instant::now();
        ctx.reply("Pong!").await?;
        let latency = started.elapsed().as_millis();
        ctx.edit_reply(&format!("Pong! `{latency} ms`")).await?;

        info!("[{}] Ping completed for user {}", ctx.request_id(), ctx.user_id());
        Ok(())
    }
}

/// `/commands`: list everything currently registered
pub struct CommandsCommand {
    registry: Weak<CommandRegistry>,
}

impl CommandsCommand {
    pub fn new(registry: &Arc<CommandRegistry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }
}

async fn render_command_list(registry: &CommandRegistry) -> String {
    let mut sections = Vec::new();
    for kind in CommandKind::ALL {
        let mut names: Vec<String> = registry
            .list(kind)
            .await
            .iter()
            .map(|d| match (kind, d.group.as_deref()) {
                (CommandKind::Slash, Some(group)) => format!("`/{group} {}`", d.name),
                (CommandKind::Slash, None) => format!("`/{}`", d.name),
                _ => format!("`{}`", d.name),
            })
            .collect();
        if names.is_empty() {
            continue;
        }
        names.sort();
        sections.push(format!("**{}** ({})\n{}", kind.label(), names.len(), names.join(", ")));
    }

    if sections.is_empty() {
        "No commands registered.".to_string()
    } else {
        sections.join("\n\n")
    }
}

#[async_trait]
impl CommandHandler for CommandsCommand {
    async fn execute(&self, ctx: &mut CommandContext, _args: &CommandArgs) -> Result<()> {
        let Some(registry) = self.registry.upgrade() else {
            return ctx.reply("Command registry is shutting down.").await;
        };
        let listing = render_command_list(&registry).await;
        for piece in split_reply(&listing, MESSAGE_LIMIT) {
            ctx.reply(&piece).await?;
        }
        Ok(())
    }
}

/// "Inspect User" user context menu
pub struct InspectUserCommand;

#[async_trait]
impl CommandHandler for InspectUserCommand {
    async fn execute(&self, ctx: &mut CommandContext, args: &CommandArgs) -> Result<()> {
        match args.get("target") {
            Some(target) => {
                ctx.reply(&format!("👤 User <@{target}>\nID: `{target}`"))
                    .await
            }
            None => ctx.reply("No target user was provided.").await,
        }
    }
}

/// Code-backed descriptors registered at boot
pub fn builtin_commands(registry: &Arc<CommandRegistry>) -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::new(
            "ping",
            CommandKind::Slash,
            "Test bot responsiveness",
            Arc::new(PingCommand),
        ),
        CommandDescriptor::new(
            "commands",
            CommandKind::Slash,
            "List registered commands",
            Arc::new(CommandsCommand::new(registry)),
        ),
        CommandDescriptor::new(
            "Inspect User",
            CommandKind::UserContextMenu,
            "",
            Arc::new(InspectUserCommand),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::context::tests::RecordingTarget;
    use crate::commands::context::ContextKind;
    use crate::commands::registry::CommandLoader;
    use std::path::Path;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct NoFiles;

    impl CommandLoader for NoFiles {
        fn load(&self, _path: &Path, _source: &str) -> Result<CommandDescriptor> {
            Err(anyhow::anyhow!("unused"))
        }
    }

    fn context(kind: ContextKind) -> (CommandContext, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let target = RecordingTarget::new(kind, &calls);
        (CommandContext::new(Box::new(target), "1", Uuid::new_v4()), calls)
    }

    async fn registry_with_builtins() -> Arc<CommandRegistry> {
        let registry = Arc::new(CommandRegistry::new(Arc::new(NoFiles)));
        for descriptor in builtin_commands(&registry) {
            registry.add_command(descriptor).await.unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_ping_reports_latency() {
        let (mut ctx, calls) = context(ContextKind::Slash);
        PingCommand.execute(&mut ctx, &CommandArgs::new()).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], "respond:Pong!");
        assert!(calls[1].starts_with("edit:Pong! `"));
        assert!(calls[1].ends_with(" ms`"));
    }

    #[tokio::test]
    async fn test_commands_lists_by_kind() {
        let registry = registry_with_builtins().await;
        let listing = render_command_list(&registry).await;
        assert!(listing.contains("**slash** (2)"));
        assert!(listing.contains("`/commands`, `/ping`"));
        assert!(listing.contains("**user** (1)\n`Inspect User`"));
        assert!(!listing.contains("**message**"));
    }

    #[tokio::test]
    async fn test_commands_handler_replies() {
        let registry = registry_with_builtins().await;
        let handler = CommandsCommand::new(&registry);
        let (mut ctx, calls) = context(ContextKind::Slash);
        handler.execute(&mut ctx, &CommandArgs::new()).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("respond:**slash**"));
    }

    #[tokio::test]
    async fn test_inspect_user_reports_target() {
        let (mut ctx, calls) = context(ContextKind::UserContextMenu);
        let mut args = CommandArgs::new();
        args.insert("target".to_string(), "80351110224678912".to_string());
        InspectUserCommand.execute(&mut ctx, &args).await.unwrap();
        assert!(calls.lock().unwrap()[0].contains("ID: `80351110224678912`"));
    }

    #[tokio::test]
    async fn test_builtins_register_once_each() {
        let registry = registry_with_builtins().await;
        assert_eq!(registry.command_count().await, 3);
        assert!(registry
            .get_user_context_menu_command("Inspect User")
            .await
            .is_some());
    }
}
