//! Platform-agnostic command context
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! Command implementations talk to a [`CommandContext`] instead of a concrete
//! serenity interaction, so the same handler serves slash commands, context
//! menus, and prefix messages, and can be driven by a test double.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use uuid::Uuid;

use super::descriptor::CommandKind;

/// Normalized classification of what triggered a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Slash,
    UserContextMenu,
    ChatContextMenu,
    Message,
}

impl From<CommandKind> for ContextKind {
    fn from(kind: CommandKind) -> Self {
        match kind {
            CommandKind::Slash => ContextKind::Slash,
            CommandKind::UserContextMenu => ContextKind::UserContextMenu,
            CommandKind::ChatContextMenu => ContextKind::ChatContextMenu,
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContextKind::Slash => "slash",
            ContextKind::UserContextMenu => "user",
            ContextKind::ChatContextMenu => "message-menu",
            ContextKind::Message => "message",
        };
        f.write_str(label)
    }
}

/// Capability surface of one underlying platform interaction
#[async_trait]
pub trait ReplyTarget: Send + Sync {
    fn kind(&self) -> ContextKind;

    /// Acknowledge now, answer later
    async fn defer(&self) -> Result<()>;

    /// Initial response
    async fn respond(&self, content: &str) -> Result<()>;

    /// Replace the initial (or deferred) response
    async fn edit(&self, content: &str) -> Result<()>;

    /// Post a follow-up after the initial response
    async fn follow_up(&self, content: &str) -> Result<()>;

    /// Whether a channel handle exists for direct sends
    fn has_channel(&self) -> bool {
        false
    }

    async fn send_to_channel(&self, _content: &str) -> Result<()> {
        Err(anyhow::anyhow!("No channel available for {}", self.kind()))
    }
}

/// Context handed to a command for one invocation
pub struct CommandContext {
    target: Box<dyn ReplyTarget>,
    request_id: Uuid,
    user_id: String,
    deferred: bool,
    replied: bool,
}

impl CommandContext {
    pub fn new(target: Box<dyn ReplyTarget>, user_id: impl Into<String>, request_id: Uuid) -> Self {
        Self {
            target,
            request_id,
            user_id: user_id.into(),
            deferred: false,
            replied: false,
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.target.kind()
    }

    pub fn deferred(&self) -> bool {
        self.deferred
    }

    pub fn replied(&self) -> bool {
        self.replied
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn defer_reply(&mut self) -> Result<()> {
        if self.deferred || self.replied {
            return Ok(());
        }
        self.target.defer().await?;
        self.deferred = true;
        Ok(())
    }

    /// Send the initial response; later calls become follow-ups
    pub async fn reply(&mut self, content: &str) -> Result<()> {
        if self.replied {
            self.target.follow_up(content).await?;
        } else if self.deferred {
            self.target.edit(content).await?;
        } else {
            self.target.respond(content).await?;
        }
        self.replied = true;
        Ok(())
    }

    /// Edit the pending response.
    ///
    /// With nothing to edit yet and a channel handle available, a fresh
    /// channel message is sent instead.
    pub async fn edit_reply(&mut self, content: &str) -> Result<()> {
        if !self.deferred && !self.replied && self.target.has_channel() {
            self.target.send_to_channel(content).await?;
        } else if !self.deferred && !self.replied {
            self.target.respond(content).await?;
        } else {
            self.target.edit(content).await?;
        }
        self.replied = true;
        Ok(())
    }

    /// Send extra messages after the first response
    pub async fn follow_up(&mut self, content: &str) -> Result<()> {
        if !self.deferred && !self.replied {
            return self.reply(content).await;
        }
        self.target.follow_up(content).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Reply target double that journals every call
    pub(crate) struct RecordingTarget {
        pub kind: ContextKind,
        pub channel: bool,
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingTarget {
        pub(crate) fn new(kind: ContextKind, calls: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                kind,
                channel: false,
                calls: Arc::clone(calls),
            }
        }

        fn push(&self, entry: String) {
            self.calls.lock().unwrap().push(entry);
        }
    }

    #[async_trait]
    impl ReplyTarget for RecordingTarget {
        fn kind(&self) -> ContextKind {
            self.kind
        }

        async fn defer(&self) -> Result<()> {
            self.push("defer".to_string());
            Ok(())
        }

        async fn respond(&self, content: &str) -> Result<()> {
            self.push(format!("respond:{content}"));
            Ok(())
        }

        async fn edit(&self, content: &str) -> Result<()> {
            self.push(format!("edit:{content}"));
            Ok(())
        }

        async fn follow_up(&self, content: &str) -> Result<()> {
            self.push(format!("follow_up:{content}"));
            Ok(())
        }

        fn has_channel(&self) -> bool {
            self.channel
        }

        async fn send_to_channel(&self, content: &str) -> Result<()> {
            self.push(format!("channel:{content}"));
            Ok(())
        }
    }

    fn context(kind: ContextKind, channel: bool) -> (CommandContext, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut target = RecordingTarget::new(kind, &calls);
        target.channel = channel;
        (
            CommandContext::new(Box::new(target), "42", Uuid::new_v4()),
            calls,
        )
    }

    #[tokio::test]
    async fn test_defer_then_edit() {
        let (mut ctx, calls) = context(ContextKind::Slash, false);
        ctx.defer_reply().await.unwrap();
        assert!(ctx.deferred());
        ctx.edit_reply("done").await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["defer", "edit:done"]);
    }

    #[tokio::test]
    async fn test_edit_without_defer_uses_channel() {
        let (mut ctx, calls) = context(ContextKind::Message, true);
        ctx.edit_reply("hello").await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["channel:hello"]);
    }

    #[tokio::test]
    async fn test_edit_without_defer_or_channel_responds() {
        let (mut ctx, calls) = context(ContextKind::Slash, false);
        ctx.edit_reply("hello").await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["respond:hello"]);
    }

    #[tokio::test]
    async fn test_second_reply_is_follow_up() {
        let (mut ctx, calls) = context(ContextKind::UserContextMenu, false);
        ctx.reply("one").await.unwrap();
        ctx.reply("two").await.unwrap();
        ctx.defer_reply().await.unwrap();
        assert!(!ctx.deferred());
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["respond:one", "follow_up:two"]
        );
    }

    #[tokio::test]
    async fn test_deferred_second_reply_is_follow_up() {
        let (mut ctx, calls) = context(ContextKind::Slash, false);
        ctx.defer_reply().await.unwrap();
        ctx.reply("first").await.unwrap();
        ctx.reply("second").await.unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["defer", "edit:first", "follow_up:second"]
        );
    }

    #[test]
    fn test_kind_from_command_kind() {
        assert_eq!(ContextKind::from(CommandKind::Slash), ContextKind::Slash);
        assert_eq!(
            ContextKind::from(CommandKind::ChatContextMenu),
            ContextKind::ChatContextMenu
        );
    }
}
