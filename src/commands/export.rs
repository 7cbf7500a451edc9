//! # Command Export and Upload
//!
//! Serialize registered commands into Discord's bulk-overwrite payload and
//! push it to the global or guild endpoint.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use anyhow::Result;
use log::{error, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::descriptor::{CommandDescriptor, CommandKind, OptionKind, OptionSpec};

/// One entry of the bulk-overwrite payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionPayload>,
    #[serde(rename = "type")]
    pub kind: u8,
}

/// A command option (or sub-command) on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionPayload {
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoicePayload>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoicePayload {
    pub name: String,
    pub value: serde_json::Value,
}

fn choice_payload(kind: OptionKind, name: &str, value: &str) -> Option<ChoicePayload> {
    let value = match kind {
        OptionKind::Integer => serde_json::Value::from(value.parse::<i64>().ok()?),
        OptionKind::Number => serde_json::Value::from(value.parse::<f64>().ok()?),
        _ => serde_json::Value::from(value),
    };
    Some(ChoicePayload {
        name: name.to_string(),
        value,
    })
}

fn option_payload(option: &OptionSpec) -> OptionPayload {
    OptionPayload {
        kind: option.kind.wire_type(),
        name: option.name.clone(),
        description: option.description.clone(),
        required: option.required,
        choices: option
            .choices
            .iter()
            .filter_map(|c| choice_payload(option.kind, &c.name, &c.value))
            .collect(),
        options: Vec::new(),
    }
}

fn subcommand_payload(descriptor: &CommandDescriptor) -> OptionPayload {
    OptionPayload {
        kind: OptionKind::SubCommand.wire_type(),
        name: descriptor.name.clone(),
        description: descriptor.description.clone(),
        required: false,
        choices: Vec::new(),
        options: descriptor.options.iter().map(option_payload).collect(),
    }
}

fn command_payload(descriptor: &CommandDescriptor) -> CommandSpec {
    // Context menus must not carry a description
    let description =
        (descriptor.kind == CommandKind::Slash).then(|| descriptor.description.clone());
    CommandSpec {
        name: descriptor.name.clone(),
        description,
        options: descriptor.options.iter().map(option_payload).collect(),
        kind: descriptor.kind.wire_type(),
    }
}

/// Build the registration payload.
///
/// Slash commands sharing a group fold into one parent whose options are
/// sub-commands. Group parents come first, then ungrouped slash commands,
/// then user and message context-menu commands.
pub fn build_export(descriptors: &[Arc<CommandDescriptor>]) -> Vec<CommandSpec> {
    let mut groups: BTreeMap<&str, Vec<&CommandDescriptor>> = BTreeMap::new();
    let mut ungrouped = Vec::new();
    let mut menus = Vec::new();

    for descriptor in descriptors {
        match (descriptor.kind, descriptor.group.as_deref()) {
            (CommandKind::Slash, Some(group)) if !group.is_empty() => {
                groups.entry(group).or_default().push(descriptor)
            }
            (CommandKind::Slash, _) => ungrouped.push(command_payload(descriptor)),
            _ => menus.push(command_payload(descriptor)),
        }
    }
    menus.sort_by_key(|spec| spec.kind);

    let mut specs: Vec<CommandSpec> = groups
        .into_iter()
        .map(|(group, members)| CommandSpec {
            name: group.to_string(),
            description: Some(format!("{group} commands")),
            options: members.into_iter().map(subcommand_payload).collect(),
            kind: CommandKind::Slash.wire_type(),
        })
        .collect();
    specs.extend(ungrouped);
    specs.extend(menus);
    specs
}

/// Where the command set is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    Global,
    Guild(u64),
}

impl UploadTarget {
    pub fn from_guild(guild_id: Option<u64>) -> Self {
        guild_id.map(UploadTarget::Guild).unwrap_or(UploadTarget::Global)
    }
}

/// Full-replace uploader for the application command endpoints
#[derive(Clone)]
pub struct CommandUploader {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl CommandUploader {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            token: token.into(),
        }
    }

    pub fn endpoint(&self, application_id: u64, target: UploadTarget) -> String {
        match target {
            UploadTarget::Global => {
                format!("{}/applications/{application_id}/commands", self.api_base)
            }
            UploadTarget::Guild(guild_id) => format!(
                "{}/applications/{application_id}/guilds/{guild_id}/commands",
                self.api_base
            ),
        }
    }

    /// PUT the payload, replacing every registered command
    pub async fn upload(
        &self,
        application_id: u64,
        target: UploadTarget,
        commands: &[CommandSpec],
    ) -> Result<()> {
        let url = self.endpoint(application_id, target);
        let response = self
            .client
            .put(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .json(commands)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Command upload rejected with {status}: {body}"
            ));
        }
        Ok(())
    }

    /// Upload and log the outcome; failures never propagate
    pub async fn upload_logged(
        &self,
        application_id: u64,
        target: UploadTarget,
        commands: &[CommandSpec],
    ) -> bool {
        match self.upload(application_id, target, commands).await {
            Ok(()) => {
                match target {
                    UploadTarget::Guild(guild_id) => info!(
                        "✅ Registered {} command(s) for guild {guild_id} (instant update)",
                        commands.len()
                    ),
                    UploadTarget::Global => info!(
                        "✅ Registered {} command(s) globally (may take up to 1 hour to propagate)",
                        commands.len()
                    ),
                }
                true
            }
            Err(e) => {
                error!("❌ Failed to register commands: {e:#}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::descriptor::tests::Journaled;
    use crate::commands::descriptor::OptionChoice;
    use std::sync::Mutex;

    fn descriptor(name: &str, kind: CommandKind, group: Option<&str>) -> Arc<CommandDescriptor> {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut d = CommandDescriptor::new(
            name,
            kind,
            format!("{name} description"),
            Arc::new(Journaled::new(name, &journal)),
        );
        if let Some(group) = group {
            d = d.with_group(group);
        }
        Arc::new(d)
    }

    #[test]
    fn test_grouping_produces_three_entries() {
        let specs = build_export(&[
            descriptor("ping", CommandKind::Slash, None),
            descriptor("add", CommandKind::Slash, Some("list")),
            descriptor("remove", CommandKind::Slash, Some("list")),
            descriptor("report", CommandKind::UserContextMenu, None),
        ]);

        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"ping"));
        assert!(names.contains(&"list"));
        assert!(names.contains(&"report"));

        let list = specs.iter().find(|s| s.name == "list").unwrap();
        assert_eq!(list.kind, 1);
        let subs: Vec<&str> = list.options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(subs, vec!["add", "remove"]);
        assert!(list.options.iter().all(|o| o.kind == 1));

        let report = specs.iter().find(|s| s.name == "report").unwrap();
        assert_eq!(report.kind, 2);
        assert!(report.description.is_none());
    }

    #[test]
    fn test_group_parents_come_first() {
        let specs = build_export(&[
            descriptor("ping", CommandKind::Slash, None),
            descriptor("add", CommandKind::Slash, Some("list")),
            descriptor("quote", CommandKind::ChatContextMenu, None),
        ]);
        assert_eq!(specs[0].name, "list");
        assert_eq!(specs[1].name, "ping");
        assert_eq!(specs[2].name, "quote");
        assert_eq!(specs[2].kind, 3);
    }

    #[test]
    fn test_wire_json_shape() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut option = OptionSpec::new("count", "How many", OptionKind::Integer).required(true);
        option.choices = vec![
            OptionChoice {
                name: "One".to_string(),
                value: "1".to_string(),
            },
            OptionChoice {
                name: "Bad".to_string(),
                value: "x".to_string(),
            },
        ];
        let d = Arc::new(
            CommandDescriptor::new(
                "roll",
                CommandKind::Slash,
                "Roll dice",
                Arc::new(Journaled::new("roll", &journal)),
            )
            .with_options(vec![option]),
        );

        let json = serde_json::to_value(build_export(&[d])).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "name": "roll",
                "description": "Roll dice",
                "type": 1,
                "options": [{
                    "type": 4,
                    "name": "count",
                    "description": "How many",
                    "required": true,
                    "choices": [{"name": "One", "value": 1}]
                }]
            }])
        );
    }

    #[test]
    fn test_context_menu_omits_description_and_options() {
        let json = serde_json::to_value(build_export(&[descriptor(
            "Inspect User",
            CommandKind::UserContextMenu,
            None,
        )]))
        .unwrap();
        assert_eq!(json, serde_json::json!([{"name": "Inspect User", "type": 2}]));
    }

    #[test]
    fn test_endpoints() {
        let uploader = CommandUploader::new("https://discord.com/api/v10", "token");
        assert_eq!(
            uploader.endpoint(10, UploadTarget::Global),
            "https://discord.com/api/v10/applications/10/commands"
        );
        assert_eq!(
            uploader.endpoint(10, UploadTarget::Guild(20)),
            "https://discord.com/api/v10/applications/10/guilds/20/commands"
        );
    }

    #[test]
    fn test_upload_target_from_guild() {
        assert_eq!(UploadTarget::from_guild(None), UploadTarget::Global);
        assert_eq!(UploadTarget::from_guild(Some(5)), UploadTarget::Guild(5));
    }

    #[tokio::test]
    async fn test_upload_failure_is_swallowed() {
        // Nothing listens on this port; the error is logged, not returned
        let uploader = CommandUploader::new("http://127.0.0.1:9", "token");
        assert!(!uploader.upload_logged(1, UploadTarget::Global, &[]).await);
    }
}
