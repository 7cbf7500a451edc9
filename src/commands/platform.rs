//! Serenity bridge
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! Classifies gateway interactions into [`InteractionRequest`]s and adapts
//! interactions and messages to the [`ReplyTarget`] capability surface.

use anyhow::Result;
use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::application::command::{CommandOptionType, CommandType};
use serenity::model::application::interaction::application_command::{
    ApplicationCommandInteraction, CommandDataOption,
};
use serenity::model::application::interaction::InteractionResponseType;
use serenity::model::id::{ChannelId, MessageId};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::context::{ContextKind, ReplyTarget};
use super::descriptor::{CommandArgs, CommandKind};
use super::dispatcher::InteractionRequest;

/// Argument name carrying the id a context menu was invoked on
pub const TARGET_ARG: &str = "target";

/// Map a platform command type onto a registry kind
pub fn classify(kind: CommandType) -> Option<CommandKind> {
    match kind {
        CommandType::ChatInput => Some(CommandKind::Slash),
        CommandType::User => Some(CommandKind::UserContextMenu),
        CommandType::Message => Some(CommandKind::ChatContextMenu),
        _ => None,
    }
}

/// Split top-level options into the invoked sub-command (if any) and its values
pub fn extract_subcommand(options: &[CommandDataOption]) -> (Option<String>, CommandArgs) {
    match options.first() {
        Some(group) if group.kind == CommandOptionType::SubCommandGroup => {
            match group.options.first() {
                Some(sub) => (Some(sub.name.clone()), extract_params(&sub.options)),
                None => (None, CommandArgs::new()),
            }
        }
        Some(sub) if sub.kind == CommandOptionType::SubCommand => {
            (Some(sub.name.clone()), extract_params(&sub.options))
        }
        _ => (None, extract_params(options)),
    }
}

/// Extract option values as strings
pub fn extract_params(options: &[CommandDataOption]) -> CommandArgs {
    let mut params = CommandArgs::new();
    for opt in options {
        if let Some(value) = &opt.value {
            let value_str = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string().trim_matches('"').to_string(),
            };
            params.insert(opt.name.clone(), value_str);
        }
    }
    params
}

/// Build a dispatchable request from an application command interaction
pub fn request_from_interaction(command: &ApplicationCommandInteraction) -> Option<InteractionRequest> {
    let kind = classify(command.data.kind)?;
    let (subcommand, mut args) = extract_subcommand(&command.data.options);
    if let Some(target) = command.data.target_id {
        args.insert(TARGET_ARG.to_string(), target.0.to_string());
    }
    Some(InteractionRequest {
        kind,
        name: command.data.name.clone(),
        subcommand,
        args,
        user_id: command.user.id.to_string(),
    })
}

/// Reply surface for slash and context-menu interactions
pub struct InteractionReply {
    http: Arc<Http>,
    command: ApplicationCommandInteraction,
    kind: ContextKind,
}

impl InteractionReply {
    pub fn new(http: Arc<Http>, command: ApplicationCommandInteraction, kind: CommandKind) -> Self {
        Self {
            http,
            command,
            kind: kind.into(),
        }
    }
}

#[async_trait]
impl ReplyTarget for InteractionReply {
    fn kind(&self) -> ContextKind {
        self.kind
    }

    async fn defer(&self) -> Result<()> {
        self.command
            .create_interaction_response(&self.http, |response| {
                response.kind(InteractionResponseType::DeferredChannelMessageWithSource)
            })
            .await?;
        Ok(())
    }

    async fn respond(&self, content: &str) -> Result<()> {
        self.command
            .create_interaction_response(&self.http, |response| {
                response
                    .kind(InteractionResponseType::ChannelMessageWithSource)
                    .interaction_response_data(|message| message.content(content))
            })
            .await?;
        Ok(())
    }

    async fn edit(&self, content: &str) -> Result<()> {
        self.command
            .edit_original_interaction_response(&self.http, |response| response.content(content))
            .await?;
        Ok(())
    }

    async fn follow_up(&self, content: &str) -> Result<()> {
        self.command
            .create_followup_message(&self.http, |message| message.content(content))
            .await?;
        Ok(())
    }
}

/// Reply surface for prefix-triggered chat messages
pub struct MessageReply {
    http: Arc<Http>,
    channel_id: ChannelId,
    /// Last message this reply posted; edits go there
    sent: Mutex<Option<MessageId>>,
}

impl MessageReply {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self {
            http,
            channel_id,
            sent: Mutex::new(None),
        }
    }

    async fn say(&self, content: &str) -> Result<()> {
        let message = self.channel_id.say(&self.http, content).await?;
        *self.sent.lock().await = Some(message.id);
        Ok(())
    }
}

#[async_trait]
impl ReplyTarget for MessageReply {
    fn kind(&self) -> ContextKind {
        ContextKind::Message
    }

    async fn defer(&self) -> Result<()> {
        self.channel_id.broadcast_typing(&self.http).await?;
        Ok(())
    }

    async fn respond(&self, content: &str) -> Result<()> {
        self.say(content).await
    }

    async fn edit(&self, content: &str) -> Result<()> {
        let sent = *self.sent.lock().await;
        match sent {
            Some(message_id) => {
                self.channel_id
                    .edit_message(&self.http, message_id, |m| m.content(content))
                    .await?;
                Ok(())
            }
            None => self.say(content).await,
        }
    }

    async fn follow_up(&self, content: &str) -> Result<()> {
        self.say(content).await
    }

    fn has_channel(&self) -> bool {
        true
    }

    async fn send_to_channel(&self, content: &str) -> Result<()> {
        self.say(content).await
    }
}
