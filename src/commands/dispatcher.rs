//! Interaction dispatcher
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! Resolves classified interactions (and prefix messages) against the
//! registry and runs the matching command behind a [`CommandContext`].
//! Unregistered commands are ignored; failures stop at this boundary.

use log::{debug, error, info};
use std::sync::Arc;
use uuid::Uuid;

use super::context::{CommandContext, ReplyTarget};
use super::descriptor::{CommandArgs, CommandDescriptor, CommandKind, OptionSpec};
use super::registry::CommandRegistry;

/// Reply sent when a command fails after it may have acknowledged the user
const FAILURE_NOTICE: &str = "❌ Sorry, I encountered an error processing your command. Please try again.";

/// Platform-independent view of one inbound invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRequest {
    pub kind: CommandKind,
    pub name: String,
    pub subcommand: Option<String>,
    pub args: CommandArgs,
    pub user_id: String,
}

impl InteractionRequest {
    pub fn new(kind: CommandKind, name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            subcommand: None,
            args: CommandArgs::new(),
            user_id: user_id.into(),
        }
    }

    pub fn with_subcommand(mut self, subcommand: impl Into<String>) -> Self {
        self.subcommand = Some(subcommand.into());
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }
}

/// What happened to a dispatched invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Executed,
    Failed,
    Unresolved,
}

/// Routes invocations to registered commands
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    prefix: Option<String>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self {
            registry,
            prefix: None,
        }
    }

    /// Enable message-triggered commands
    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix.filter(|p| !p.is_empty());
        self
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Find the descriptor an invocation targets
    ///
    /// Slash invocations carrying a sub-command resolve by the sub-command
    /// name first (grouped commands), then by the top-level name.
    pub async fn resolve(&self, request: &InteractionRequest) -> Option<Arc<CommandDescriptor>> {
        let found = match request.kind {
            CommandKind::Slash => {
                let by_subcommand = match &request.subcommand {
                    Some(sub) => self
                        .registry
                        .get_slash_command(sub)
                        .await
                        .filter(|d| d.group.as_deref().map_or(true, |g| g == request.name)),
                    None => None,
                };
                match by_subcommand {
                    Some(descriptor) => Some(descriptor),
                    None => self.registry.get_slash_command(&request.name).await,
                }
            }
            CommandKind::UserContextMenu => {
                self.registry
                    .get_user_context_menu_command(&request.name)
                    .await
            }
            CommandKind::ChatContextMenu => {
                self.registry
                    .get_chat_context_menu_command(&request.name)
                    .await
            }
        };

        match found {
            Some(descriptor) if descriptor.is_loaded() => Some(descriptor),
            Some(descriptor) => {
                debug!(
                    "{} is {:?}; treating as unresolved",
                    descriptor.unique_id(),
                    descriptor.state()
                );
                None
            }
            None => None,
        }
    }

    /// Resolve and execute one invocation
    pub async fn dispatch(
        &self,
        request: InteractionRequest,
        target: Box<dyn ReplyTarget>,
    ) -> DispatchOutcome {
        let request_id = Uuid::new_v4();
        let Some(descriptor) = self.resolve(&request).await else {
            debug!(
                "[{request_id}] No {} command registered for '{}'{}",
                request.kind,
                request.name,
                request
                    .subcommand
                    .as_deref()
                    .map(|s| format!(" {s}"))
                    .unwrap_or_default()
            );
            return DispatchOutcome::Unresolved;
        };

        info!(
            "[{request_id}] 📥 {} | Command: {} | User: {}",
            target.kind(),
            descriptor.unique_id(),
            request.user_id
        );

        let unique_id = descriptor.unique_id();
        let InteractionRequest { args, user_id, .. } = request;
        let task = tokio::spawn(async move {
            let mut ctx = CommandContext::new(target, user_id, request_id);
            let result = descriptor.execute(&mut ctx, &args).await;
            if result.is_err() {
                if let Err(e) = ctx.edit_reply(FAILURE_NOTICE).await {
                    debug!("[{request_id}] Could not send failure notice: {e}");
                }
            }
            result
        });

        match task.await {
            Ok(Ok(())) => {
                debug!("[{request_id}] ✅ {unique_id} completed");
                DispatchOutcome::Executed
            }
            Ok(Err(e)) => {
                error!("[{request_id}] ❌ Error executing {unique_id}: {e:#}");
                DispatchOutcome::Failed
            }
            Err(e) => {
                error!("[{request_id}] 💥 {unique_id} aborted: {e}");
                DispatchOutcome::Failed
            }
        }
    }

    /// Turn a prefixed chat message into a slash invocation
    ///
    /// `<prefix><name> args...` or `<prefix><group> <name> args...`. Returns
    /// `None` when the message does not start with the prefix or names no
    /// registered command.
    pub async fn parse_message(&self, content: &str, user_id: &str) -> Option<InteractionRequest> {
        let prefix = self.prefix.as_deref()?;
        let body = content.trim_start().strip_prefix(prefix)?;
        let words: Vec<&str> = body.split_whitespace().collect();
        let (first, rest) = words.split_first()?;

        if let Some((second, tail)) = rest.split_first() {
            if let Some(descriptor) = self.registry.get_grouped_slash_command(first, second).await {
                let mut request = InteractionRequest::new(CommandKind::Slash, *first, user_id)
                    .with_subcommand(*second);
                request.args = bind_positional(&descriptor.options, tail);
                return Some(request);
            }
        }

        let descriptor = self.registry.get_slash_command(first).await?;
        let mut request = InteractionRequest::new(CommandKind::Slash, *first, user_id);
        request.args = bind_positional(&descriptor.options, rest);
        Some(request)
    }

    /// Dispatch a chat message if it is a prefix command
    pub async fn dispatch_message(
        &self,
        content: &str,
        user_id: &str,
        target: Box<dyn ReplyTarget>,
    ) -> DispatchOutcome {
        match self.parse_message(content, user_id).await {
            Some(request) => self.dispatch(request, target).await,
            None => DispatchOutcome::Unresolved,
        }
    }
}

/// Bind words to declared options in order; the last option takes the rest
pub fn bind_positional(options: &[OptionSpec], words: &[&str]) -> CommandArgs {
    let mut args = CommandArgs::new();
    for (index, option) in options.iter().enumerate() {
        if index >= words.len() {
            break;
        }
        let value = if index == options.len() - 1 {
            words[index..].join(" ")
        } else {
            words[index].to_string()
        };
        args.insert(option.name.clone(), value);
    }
    args
}
