//! # Manifest-backed Commands
//!
//! Turns a parsed [`CommandManifest`] into a registry descriptor and runs it.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::commands::context::CommandContext;
use crate::commands::descriptor::{CommandArgs, CommandDescriptor, CommandHandler};
use crate::commands::registry::CommandLoader;
use crate::core::response::{fenced_output, split_reply, MESSAGE_LIMIT};
use crate::features::plugins::config::{substitute_template, CommandManifest};
use crate::features::plugins::executor::{validate_params, PluginExecutor};

/// Command whose behavior is a CLI invocation described by a manifest
pub struct ManifestCommand {
    manifest: CommandManifest,
    executor: PluginExecutor,
}

impl ManifestCommand {
    pub fn new(manifest: CommandManifest, executor: PluginExecutor) -> Self {
        Self { manifest, executor }
    }

    pub fn manifest(&self) -> &CommandManifest {
        &self.manifest
    }

    fn render_error(&self, error: &str) -> String {
        match &self.manifest.reply.error_template {
            Some(template) => template.replace("${error}", error),
            None => format!("❌ {error}"),
        }
    }

    fn render_output(&self, output: &str, params: &HashMap<String, String>) -> Vec<String> {
        match &self.manifest.reply.template {
            Some(template) => {
                let mut values = params.clone();
                values.insert("output".to_string(), output.trim_end().to_string());
                split_reply(&substitute_template(template, &values), MESSAGE_LIMIT)
            }
            None => fenced_output(output),
        }
    }
}

#[async_trait]
impl CommandHandler for ManifestCommand {
    async fn execute(&self, ctx: &mut CommandContext, args: &CommandArgs) -> Result<()> {
        ctx.defer_reply().await?;
        let request_id = ctx.request_id();

        let params = match self
            .manifest
            .resolve_params(args)
            .and_then(|params| validate_params(&params).map(|()| params))
        {
            Ok(params) => params,
            Err(e) => {
                warn!("[{request_id}] Rejected input for {}: {e}", self.manifest.name);
                return ctx.edit_reply(&self.render_error(&e.to_string())).await;
            }
        };

        let result = self.executor.execute(&self.manifest.execution, &params).await?;

        if !result.success {
            let reason = result.failure_reason();
            return ctx.edit_reply(&self.render_error(&reason)).await;
        }

        let mut pieces = self.render_output(&result.stdout, &params).into_iter();
        if let Some(first) = pieces.next() {
            ctx.edit_reply(&first).await?;
        }
        for piece in pieces {
            ctx.follow_up(&piece).await?;
        }
        Ok(())
    }

    async fn on_load(&self) -> Result<()> {
        if !self.executor.is_allowed(&self.manifest.execution.command) {
            return Err(anyhow::anyhow!(
                "Executable '{}' for {} is not in ALLOWED_EXECUTABLES",
                self.manifest.execution.command,
                self.manifest.name
            ));
        }
        Ok(())
    }

    async fn on_destroy(&self) -> Result<()> {
        info!("🧹 Released {}", self.manifest.name);
        Ok(())
    }
}

/// Builds descriptors from manifest files
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    executor: PluginExecutor,
}

impl ManifestLoader {
    pub fn new(executor: PluginExecutor) -> Self {
        Self { executor }
    }
}

impl CommandLoader for ManifestLoader {
    fn load(&self, _path: &Path, source: &str) -> Result<CommandDescriptor> {
        let manifest = CommandManifest::parse(source)?;
        let kind = manifest.command_kind();
        let options = manifest.option_specs();
        let group = manifest.group.clone();
        let requires = manifest.requires.clone();
        let name = manifest.name.clone();
        let description = manifest.description.clone();

        let handler = ManifestCommand::new(manifest, self.executor.clone());
        let mut descriptor = CommandDescriptor::new(name, kind, description, Arc::new(handler))
            .with_options(options)
            .with_dependencies(requires);
        if let Some(group) = group {
            descriptor = descriptor.with_group(group);
        }
        Ok(descriptor)
    }
}
