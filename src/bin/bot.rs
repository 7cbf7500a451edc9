use anyhow::Result;
use dotenvy::dotenv;
use log::{debug, error, info, warn};
use serenity::async_trait;
use serenity::model::application::interaction::Interaction;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use switchboard::commands::platform::{request_from_interaction, InteractionReply, MessageReply};
use switchboard::commands::{
    builtin_commands, CommandRegistry, CommandUploader, CommandWatcher, Dispatcher, UploadTarget,
};
use switchboard::core::Config;
use switchboard::features::{ManifestLoader, PluginExecutor};

struct Handler {
    dispatcher: Dispatcher,
    uploader: CommandUploader,
    application_id: Option<u64>,
    upload_target: UploadTarget,
    /// Set once the re-upload task is running; Ready fires again on reconnect
    sync_started: AtomicBool,
}

impl Handler {
    async fn upload_snapshot(&self, application_id: u64) {
        let specs = self.dispatcher.registry().export_snapshot().await;
        self.uploader
            .upload_logged(application_id, self.upload_target, &specs)
            .await;
    }

    /// Upload the current set, then re-upload whenever the registry changes
    async fn sync_commands(&self, application_id: u64) {
        if self.sync_started.swap(true, Ordering::SeqCst) {
            self.upload_snapshot(application_id).await;
            return;
        }
        let registry = Arc::clone(self.dispatcher.registry());
        // Subscribe before the first snapshot so no change falls in between
        let mut revisions = registry.subscribe();
        self.upload_snapshot(application_id).await;

        let uploader = self.uploader.clone();
        let target = self.upload_target;
        tokio::spawn(async move {
            while revisions.changed().await.is_ok() {
                let revision = *revisions.borrow_and_update();
                debug!("Command set changed (revision {revision}), re-uploading");
                let specs = registry.export_snapshot().await;
                uploader.upload_logged(application_id, target, &specs).await;
            }
        });
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let target = Box::new(MessageReply::new(Arc::clone(&ctx.http), msg.channel_id));
        self.dispatcher
            .dispatch_message(&msg.content, &msg.author.id.to_string(), target)
            .await;
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🎉 {} is connected and ready!", ready.user.name);
        info!("📡 Connected to {} guilds", ready.guilds.len());
        info!("🤖 Bot ID: {}", ready.user.id);

        if let Some(shard) = ready.shard {
            info!("⚡ Shard: {}/{}", shard[0] + 1, shard[1]);
        }

        let application_id = self.application_id.unwrap_or(ready.application.id.0);
        let registry = self.dispatcher.registry();
        info!(
            "🔌 {} command(s) registered, uploading to {:?}",
            registry.command_count().await,
            self.upload_target
        );

        self.sync_commands(application_id).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::ApplicationCommand(command) => {
                let Some(request) = request_from_interaction(&command) else {
                    debug!("Ignoring unsupported command type for '{}'", command.data.name);
                    return;
                };
                let target = Box::new(InteractionReply::new(
                    Arc::clone(&ctx.http),
                    command,
                    request.kind,
                ));
                self.dispatcher.dispatch(request, target).await;
            }
            Interaction::Ping(_) => {
                info!("🏓 Received ping interaction");
            }
            _ => {
                debug!("Ignoring unsupported interaction type");
            }
        }
    }
}

async fn build_registry(config: &Config) -> Result<Arc<CommandRegistry>> {
    let executor = PluginExecutor::new(config.allowed_executables.clone());
    let registry = Arc::new(
        CommandRegistry::new(Arc::new(ManifestLoader::new(executor)))
            .with_debounce(config.reload_debounce),
    );

    std::fs::create_dir_all(&config.commands_dir)?;
    match CommandWatcher::start(&config.commands_dir) {
        Ok((watcher, events)) => {
            registry.attach_watcher(Arc::new(watcher));
            registry.spawn_watch_loop(events);
        }
        Err(e) => warn!(
            "⚠️ Hot reload disabled, could not watch {}: {e}",
            config.commands_dir.display()
        ),
    }

    for descriptor in builtin_commands(&registry) {
        if let Err(e) = registry.add_command(descriptor).await {
            error!("❌ Failed to register built-in command: {e:#}");
        }
    }

    let summary = registry.import_directory(&config.commands_dir).await?;
    for path in &summary.failed {
        warn!("⚠️ Skipped {}", path.display());
    }
    Ok(registry)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting Switchboard command host...");

    let registry = build_registry(&config).await?;
    let dispatcher = Dispatcher::new(Arc::clone(&registry)).with_prefix(config.command_prefix.clone());

    let handler = Handler {
        dispatcher,
        uploader: CommandUploader::new(config.api_base.clone(), config.discord_token.clone()),
        application_id: config.discord_application_id,
        upload_target: UploadTarget::from_guild(config.discord_guild_id),
        sync_started: AtomicBool::new(false),
    };

    let mut intents = GatewayIntents::GUILDS;
    if config.command_prefix.is_some() {
        intents |= GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;
    }

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    let shard_manager = Arc::clone(&client.shard_manager);
    let shutdown_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            return;
        }
        info!("🛑 Ctrl-C received, shutting down");
        shutdown_registry.shutdown().await;
        shard_manager.lock().await.shutdown_all().await;
    });

    info!("Establishing WebSocket connection to Discord gateway...");
    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    Ok(())
}
