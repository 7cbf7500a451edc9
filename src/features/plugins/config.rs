//! # Command Manifest Schema
//!
//! YAML command manifests with schema validation. One manifest describes one
//! command: its Discord surface, the CLI it runs, and how output is rendered.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::commands::descriptor::{CommandArgs, CommandKind, OptionChoice, OptionKind, OptionSpec};

/// Discord limit for command and option names
const MAX_NAME_LEN: usize = 32;

/// Discord limit for descriptions
const MAX_DESCRIPTION_LEN: usize = 100;

/// Which surface the command appears on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    #[default]
    Slash,
    User,
    Message,
}

impl From<ManifestKind> for CommandKind {
    fn from(kind: ManifestKind) -> Self {
        match kind {
            ManifestKind::Slash => CommandKind::Slash,
            ManifestKind::User => CommandKind::UserContextMenu,
            ManifestKind::Message => CommandKind::ChatContextMenu,
        }
    }
}

/// A single command manifest
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandManifest {
    /// Command name as shown in Discord
    pub name: String,

    /// Command description (ignored for context menus)
    #[serde(default)]
    pub description: String,

    #[serde(rename = "type", default)]
    pub kind: ManifestKind,

    /// Export as a sub-command of this group (slash only)
    #[serde(default)]
    pub group: Option<String>,

    /// Plugins that must be registered before this command loads
    #[serde(default)]
    pub requires: Vec<String>,

    #[serde(default)]
    pub options: Vec<CommandOption>,

    pub execution: ExecutionConfig,

    #[serde(default)]
    pub reply: ReplyConfig,
}

/// A single command option/parameter
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandOption {
    pub name: String,

    pub description: String,

    /// Option type: string, integer, boolean, user, channel, role, number, ...
    #[serde(rename = "type", default = "default_string")]
    pub option_type: String,

    #[serde(default)]
    pub required: bool,

    /// Value used when the option is omitted
    #[serde(default)]
    pub default: Option<String>,

    #[serde(default)]
    pub validation: Option<ValidationRule>,

    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// Validation rules for an option
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ValidationRule {
    /// Regex the value must match
    pub pattern: Option<String>,

    pub min_length: Option<usize>,

    pub max_length: Option<usize>,
}

/// A predefined choice for an option
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Choice {
    /// Display name
    pub name: String,

    /// Actual value
    pub value: String,
}

/// CLI execution configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Executable to run; must be on the allowlist
    pub command: String,

    /// Command arguments with ${param} placeholders
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    pub working_directory: Option<String>,

    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// How output is rendered back to the user
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReplyConfig {
    /// Message template with ${output} and ${param} placeholders.
    /// Output is posted in code fences when unset.
    pub template: Option<String>,

    /// Failure template with an ${error} placeholder
    pub error_template: Option<String>,
}

fn default_string() -> String {
    "string".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_output() -> usize {
    1_048_576 // 1MB
}

/// Slash command and option names: lowercase letters, digits, `_` and `-`
fn is_valid_slash_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

impl CommandManifest {
    /// Parse and validate a manifest from YAML source
    pub fn parse(source: &str) -> Result<Self> {
        let manifest: CommandManifest = serde_yaml::from_str(source)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn command_kind(&self) -> CommandKind {
        self.kind.into()
    }

    /// Check the manifest against Discord's naming rules and compile patterns
    pub fn validate(&self) -> Result<()> {
        let slash = self.kind == ManifestKind::Slash;

        if self.name.trim().is_empty() {
            return Err(anyhow::anyhow!("Command name must not be empty"));
        }
        if slash && !is_valid_slash_name(&self.name) {
            return Err(anyhow::anyhow!(
                "Command name must be lowercase: {}",
                self.name
            ));
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(anyhow::anyhow!(
                "Command name too long (max {MAX_NAME_LEN} chars): {}",
                self.name
            ));
        }

        if slash && self.description.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Slash command {} needs a description",
                self.name
            ));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(anyhow::anyhow!(
                "Command description too long (max {MAX_DESCRIPTION_LEN} chars): {}",
                self.name
            ));
        }

        if let Some(group) = &self.group {
            if !slash {
                return Err(anyhow::anyhow!(
                    "Context menu command {} cannot belong to group {group}",
                    self.name
                ));
            }
            if !is_valid_slash_name(group) {
                return Err(anyhow::anyhow!("Group name must be lowercase: {group}"));
            }
        }

        if !slash && !self.options.is_empty() {
            return Err(anyhow::anyhow!(
                "Context menu command {} cannot declare options",
                self.name
            ));
        }

        if self.execution.command.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Command {} has no execution command",
                self.name
            ));
        }

        for opt in &self.options {
            if !is_valid_slash_name(&opt.name) {
                return Err(anyhow::anyhow!(
                    "Option name must be lowercase: {} in command {}",
                    opt.name,
                    self.name
                ));
            }
            if let Some(pattern) = opt.validation.as_ref().and_then(|v| v.pattern.as_ref()) {
                regex::Regex::new(pattern).map_err(|e| {
                    anyhow::anyhow!(
                        "Invalid regex pattern for option '{}' in command '{}': {}",
                        opt.name,
                        self.name,
                        e
                    )
                })?;
            }
        }
        Ok(())
    }

    /// Option declarations in registry form
    pub fn option_specs(&self) -> Vec<OptionSpec> {
        self.options
            .iter()
            .map(|opt| {
                let mut spec = OptionSpec::new(
                    &opt.name,
                    &opt.description,
                    OptionKind::parse(&opt.option_type),
                )
                .required(opt.required);
                spec.choices = opt
                    .choices
                    .iter()
                    .map(|c| OptionChoice {
                        name: c.name.clone(),
                        value: c.value.clone(),
                    })
                    .collect();
                spec
            })
            .collect()
    }

    /// Fill defaults and check every declared option against its rules.
    ///
    /// Arguments not declared as options (such as a context menu `target`)
    /// pass through unchanged.
    pub fn resolve_params(&self, args: &CommandArgs) -> Result<HashMap<String, String>> {
        let mut params: HashMap<String, String> = args.clone();

        for opt in &self.options {
            if !params.contains_key(&opt.name) {
                if let Some(default) = &opt.default {
                    params.insert(opt.name.clone(), default.clone());
                }
            }

            let Some(val) = params.get(&opt.name) else {
                if opt.required {
                    return Err(anyhow::anyhow!("Missing required parameter: {}", opt.name));
                }
                continue;
            };

            let Some(validation) = &opt.validation else {
                continue;
            };

            if let Some(pattern) = &validation.pattern {
                let re = regex::Regex::new(pattern)?;
                if !re.is_match(val) {
                    return Err(anyhow::anyhow!(
                        "Parameter '{}' does not match required format",
                        opt.name
                    ));
                }
            }
            let len = val.chars().count();
            if let Some(min_len) = validation.min_length {
                if len < min_len {
                    return Err(anyhow::anyhow!(
                        "Parameter '{}' must be at least {} characters",
                        opt.name,
                        min_len
                    ));
                }
            }
            if let Some(max_len) = validation.max_length {
                if len > max_len {
                    return Err(anyhow::anyhow!(
                        "Parameter '{}' must be at most {} characters",
                        opt.name,
                        max_len
                    ));
                }
            }
        }
        Ok(params)
    }
}

/// Replace ${key} placeholders with values from `params`
pub fn substitute_template(template: &str, params: &HashMap<String, String>) -> String {
    params.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("${{{key}}}"), value)
    })
}
