//! Hot-reloading command registry
//!
//! - **Version**: 2.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 2.0.0: Kind-keyed tables, file-backed imports, debounced reload
//! - 1.0.0: Name -> handler map
//!
//! Mutations (add, remove, reload, delete, shutdown) are serialized through a
//! single async gate and always await the outgoing descriptor's destroy hook
//! before the replacement is inserted and loaded, so at most one live
//! descriptor exists per `(kind, name)`. Lookups only take a short read lock.

use anyhow::{Context as _, Result};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::descriptor::{CommandDescriptor, CommandKind, CommandState};
use super::export::{build_export, CommandSpec};
use super::watcher::{is_command_file, normalize_path, CommandWatcher, FileEvent};
use crate::core::config::DEFAULT_RELOAD_DEBOUNCE_SECS;

/// Builds a descriptor from the contents of a command file
pub trait CommandLoader: Send + Sync {
    fn load(&self, path: &Path, source: &str) -> Result<CommandDescriptor>;
}

/// Outcome of a directory import
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub loaded: Vec<String>,
    pub failed: Vec<PathBuf>,
    pub plugins: Vec<String>,
}

/// A scheduled reload for one path; a newer event replaces it
struct PendingReload {
    generation: u64,
    deadline: Instant,
    coalesced: u32,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct RegistryState {
    slash: BTreeMap<String, Arc<CommandDescriptor>>,
    user_menu: BTreeMap<String, Arc<CommandDescriptor>>,
    chat_menu: BTreeMap<String, Arc<CommandDescriptor>>,
    paths: HashMap<PathBuf, Arc<CommandDescriptor>>,
}

impl RegistryState {
    fn table(&self, kind: CommandKind) -> &BTreeMap<String, Arc<CommandDescriptor>> {
        match kind {
            CommandKind::Slash => &self.slash,
            CommandKind::UserContextMenu => &self.user_menu,
            CommandKind::ChatContextMenu => &self.chat_menu,
        }
    }

    fn table_mut(&mut self, kind: CommandKind) -> &mut BTreeMap<String, Arc<CommandDescriptor>> {
        match kind {
            CommandKind::Slash => &mut self.slash,
            CommandKind::UserContextMenu => &mut self.user_menu,
            CommandKind::ChatContextMenu => &mut self.chat_menu,
        }
    }

    /// Drop every map entry pointing at exactly this descriptor
    fn detach(&mut self, descriptor: &Arc<CommandDescriptor>) {
        let table = self.table_mut(descriptor.kind);
        if table
            .get(&descriptor.name)
            .is_some_and(|d| Arc::ptr_eq(d, descriptor))
        {
            table.remove(&descriptor.name);
        }
        if let Some(source) = descriptor.source() {
            if self
                .paths
                .get(source)
                .is_some_and(|d| Arc::ptr_eq(d, descriptor))
            {
                self.paths.remove(source);
            }
        }
    }

    fn attach(&mut self, descriptor: &Arc<CommandDescriptor>) {
        self.table_mut(descriptor.kind)
            .insert(descriptor.name.clone(), Arc::clone(descriptor));
        if let Some(source) = descriptor.source() {
            self.paths.insert(source.to_path_buf(), Arc::clone(descriptor));
        }
    }

    fn all(&self) -> Vec<Arc<CommandDescriptor>> {
        CommandKind::ALL
            .iter()
            .flat_map(|kind| self.table(*kind).values().cloned())
            .collect()
    }
}

/// Registry of slash, user-menu and message-menu commands
pub struct CommandRegistry {
    state: RwLock<RegistryState>,
    mutation: Mutex<()>,
    plugins: DashSet<String>,
    source_plugins: DashMap<PathBuf, Option<String>>,
    pending: DashMap<PathBuf, PendingReload>,
    next_generation: AtomicU64,
    debounce: Duration,
    loader: Arc<dyn CommandLoader>,
    watcher: OnceLock<Arc<CommandWatcher>>,
    revision: watch::Sender<u64>,
    closed: AtomicBool,
}

impl CommandRegistry {
    pub fn new(loader: Arc<dyn CommandLoader>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: RwLock::new(RegistryState::default()),
            mutation: Mutex::new(()),
            plugins: DashSet::new(),
            source_plugins: DashMap::new(),
            pending: DashMap::new(),
            next_generation: AtomicU64::new(0),
            debounce: Duration::from_secs(DEFAULT_RELOAD_DEBOUNCE_SECS),
            loader,
            watcher: OnceLock::new(),
            revision,
            closed: AtomicBool::new(false),
        }
    }

    /// Override the reload debounce window
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Attach the watcher that receives newly imported files
    pub fn attach_watcher(&self, watcher: Arc<CommandWatcher>) {
        if self.watcher.set(watcher).is_err() {
            warn!("Command watcher already attached; ignoring");
        }
    }

    /// Revision counter bumped after every change to the command set
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// True once `shutdown` has started; file events are dropped from then on
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    pub fn register_plugin(&self, name: impl Into<String>) {
        let name = name.into();
        if self.plugins.insert(name.clone()) {
            info!("🔌 Plugin available: {name}");
        }
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains(name)
    }

    fn plugin_snapshot(&self) -> BTreeSet<String> {
        self.plugins.iter().map(|p| p.key().clone()).collect()
    }

    // ---- lookups ----

    pub async fn get(&self, kind: CommandKind, name: &str) -> Option<Arc<CommandDescriptor>> {
        self.state.read().await.table(kind).get(name).cloned()
    }

    pub async fn get_slash_command(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        self.get(CommandKind::Slash, name).await
    }

    pub async fn get_user_context_menu_command(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        self.get(CommandKind::UserContextMenu, name).await
    }

    pub async fn get_chat_context_menu_command(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        self.get(CommandKind::ChatContextMenu, name).await
    }

    /// Slash command that is exported as a sub-command of `group`
    pub async fn get_grouped_slash_command(
        &self,
        group: &str,
        name: &str,
    ) -> Option<Arc<CommandDescriptor>> {
        self.get_slash_command(name)
            .await
            .filter(|d| d.group.as_deref() == Some(group))
    }

    pub async fn descriptor_for_path(&self, path: &Path) -> Option<Arc<CommandDescriptor>> {
        let path = normalize_path(path);
        self.state.read().await.paths.get(&path).cloned()
    }

    pub async fn list(&self, kind: CommandKind) -> Vec<Arc<CommandDescriptor>> {
        self.state.read().await.table(kind).values().cloned().collect()
    }

    /// Every live descriptor, slash first, then user menus, then message menus
    pub async fn snapshot(&self) -> Vec<Arc<CommandDescriptor>> {
        self.state.read().await.all()
    }

    pub async fn command_count(&self) -> usize {
        let state = self.state.read().await;
        state.slash.len() + state.user_menu.len() + state.chat_menu.len()
    }

    pub async fn tracked_path_count(&self) -> usize {
        self.state.read().await.paths.len()
    }

    /// Wire payload for the command registration endpoint
    pub async fn export_snapshot(&self) -> Vec<CommandSpec> {
        build_export(&self.snapshot().await)
    }

    pub fn pending_reloads(&self) -> usize {
        self.pending.len()
    }

    // ---- mutation ----

    /// Insert a descriptor, destroying whatever occupied its slot first, then load it
    pub async fn add_command(&self, descriptor: CommandDescriptor) -> Result<Arc<CommandDescriptor>> {
        let _gate = self.mutation.lock().await;
        self.install(Arc::new(descriptor)).await
    }

    /// Caller must hold the mutation gate
    async fn install(&self, descriptor: Arc<CommandDescriptor>) -> Result<Arc<CommandDescriptor>> {
        let unique_id = descriptor.unique_id();

        let displaced: Vec<Arc<CommandDescriptor>> = {
            let mut state = self.state.write().await;
            let mut displaced = Vec::new();
            if let Some(existing) = state.table(descriptor.kind).get(&descriptor.name).cloned() {
                state.detach(&existing);
                displaced.push(existing);
            }
            if let Some(source) = descriptor.source() {
                if let Some(existing) = state.paths.get(source).cloned() {
                    state.detach(&existing);
                    displaced.push(existing);
                }
            }
            displaced
        };

        for old in displaced {
            info!("♻️ Replacing {} (state {:?})", old.unique_id(), old.state());
            if let Err(e) = old.destroy().await {
                error!("❌ Failed to destroy {} before replacement: {e:#}", old.unique_id());
                self.bump_revision();
                return Err(e.context(format!("destroying previous {}", old.unique_id())));
            }
        }

        self.state.write().await.attach(&descriptor);

        if let Err(e) = descriptor.load(&self.plugin_snapshot()).await {
            self.state.write().await.detach(&descriptor);
            error!("❌ Failed to load {unique_id}: {e:#}");
            self.bump_revision();
            return Err(e.context(format!("loading {unique_id}")));
        }

        info!(
            "✅ Loaded {unique_id}{}",
            descriptor
                .owning_plugin()
                .map(|p| format!(" (plugin {p})"))
                .unwrap_or_default()
        );
        self.bump_revision();
        Ok(descriptor)
    }

    /// Destroy and drop a command. Returns false if nothing was registered.
    pub async fn remove_command(&self, kind: CommandKind, name: &str) -> Result<bool> {
        let _gate = self.mutation.lock().await;
        let removed = {
            let mut state = self.state.write().await;
            let existing = state.table(kind).get(name).cloned();
            if let Some(existing) = &existing {
                state.detach(existing);
            }
            existing
        };
        let Some(removed) = removed else {
            return Ok(false);
        };
        let destroyed = removed.destroy().await;
        self.bump_revision();
        destroyed.with_context(|| format!("destroying {}", removed.unique_id()))?;
        info!("🗑️ Removed {}", removed.unique_id());
        Ok(true)
    }

    // ---- file-backed imports ----

    fn read_descriptor(&self, path: &Path, plugin: Option<&str>) -> Result<CommandDescriptor> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut descriptor = self
            .loader
            .load(path, &source)
            .with_context(|| format!("parsing {}", path.display()))?
            .with_source(path);
        if let Some(plugin) = plugin {
            descriptor = descriptor.with_plugin(plugin);
        }
        Ok(descriptor)
    }

    /// Import a file-backed command and add its path to the watch set
    pub async fn try_import(&self, path: &Path, plugin: Option<&str>) -> Result<Arc<CommandDescriptor>> {
        let path = normalize_path(path);
        self.source_plugins
            .insert(path.clone(), plugin.map(str::to_string));

        // Watch even when the import fails so a fixed file gets picked up
        if let Some(watcher) = self.watcher.get() {
            if let Err(e) = watcher.watch(&path) {
                warn!("Failed to watch {}: {e}", path.display());
            }
        }

        let descriptor = self.read_descriptor(&path, plugin)?;
        let _gate = self.mutation.lock().await;
        self.install(Arc::new(descriptor)).await
    }

    /// Import a command file; failures are logged and leave the registry usable
    pub async fn import_from_path(
        &self,
        path: &Path,
        plugin: Option<&str>,
    ) -> Option<Arc<CommandDescriptor>> {
        match self.try_import(path, plugin).await {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                error!("❌ Failed to import command from {}: {e:#}", path.display());
                None
            }
        }
    }

    /// Import every command file under `root`.
    ///
    /// Files directly in `root` have no owning plugin; each immediate
    /// sub-directory is a plugin and owns every file beneath it.
    pub async fn import_directory(&self, root: &Path) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        let mut batches: Vec<(Option<String>, Vec<PathBuf>)> = Vec::new();

        let mut root_files = Vec::new();
        for entry in sorted_entries(root)? {
            if entry.is_dir() {
                let Some(plugin) = entry.file_name().and_then(|n| n.to_str()).map(str::to_string)
                else {
                    continue;
                };
                let mut files = Vec::new();
                collect_command_files(&entry, &mut files)?;
                self.register_plugin(plugin.clone());
                summary.plugins.push(plugin.clone());
                batches.push((Some(plugin), files));
            } else if is_command_file(&entry) {
                root_files.push(entry);
            }
        }
        batches.insert(0, (None, root_files));

        for (plugin, files) in batches {
            for file in files {
                match self.import_from_path(&file, plugin.as_deref()).await {
                    Some(descriptor) => summary.loaded.push(descriptor.unique_id()),
                    None => summary.failed.push(file),
                }
            }
        }

        info!(
            "📦 Imported {} command(s) from {} ({} failed, {} plugin(s))",
            summary.loaded.len(),
            root.display(),
            summary.failed.len(),
            summary.plugins.len()
        );
        Ok(summary)
    }

    // ---- file events ----

    pub async fn handle_file_added(&self, path: &Path) {
        let path = normalize_path(path);
        let tracked = self.state.read().await.paths.contains_key(&path)
            || self.source_plugins.contains_key(&path);
        if tracked {
            debug!("Ignoring add for tracked file {}", path.display());
            return;
        }
        info!(
            "📄 Discovered new command file {} (imported on next boot)",
            path.display()
        );
    }

    /// Schedule a reload `debounce` after the latest change for this path.
    ///
    /// A newer event cancels and replaces the pending timer, so a burst of
    /// writes collapses into a single reload.
    pub fn handle_file_changed(self: &Arc<Self>, path: &Path) {
        if self.is_closed() {
            return;
        }
        let path = normalize_path(path);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + self.debounce;

        match self.pending.entry(path.clone()) {
            Entry::Occupied(mut slot) => {
                let pending = slot.get_mut();
                pending.handle.abort();
                debug!(
                    "Resetting reload timer for {} (was due in {:?})",
                    path.display(),
                    pending.deadline.saturating_duration_since(Instant::now())
                );
                let coalesced = pending.coalesced + 1;
                *pending = PendingReload {
                    generation,
                    deadline,
                    coalesced,
                    handle: self.spawn_reload(path.clone(), generation, deadline),
                };
            }
            Entry::Vacant(slot) => {
                debug!("Scheduling reload for {} in {:?}", path.display(), self.debounce);
                slot.insert(PendingReload {
                    generation,
                    deadline,
                    coalesced: 1,
                    handle: self.spawn_reload(path.clone(), generation, deadline),
                });
            }
        }
    }

    fn spawn_reload(self: &Arc<Self>, path: PathBuf, generation: u64, deadline: Instant) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some((_, pending)) = registry
                .pending
                .remove_if(&path, |_, p| p.generation == generation)
            else {
                return;
            };
            info!(
                "🔄 Reloading {} ({} change event(s) coalesced)",
                path.display(),
                pending.coalesced
            );
            if let Err(e) = registry.reload_path(&path).await {
                error!("❌ Reload of {} failed: {e:#}", path.display());
            }
        })
    }

    /// Destroy the command sourced from `path` and import the file again
    pub async fn reload_path(&self, path: &Path) -> Result<()> {
        let path = normalize_path(path);
        let _gate = self.mutation.lock().await;
        if self.is_closed() {
            debug!("Registry closed; dropping reload of {}", path.display());
            return Ok(());
        }

        let current = self.state.read().await.paths.get(&path).cloned();
        if let Some(current) = &current {
            if current.state() == CommandState::Destroying {
                warn!(
                    "⏭️ {} is already being destroyed; skipping reload",
                    current.unique_id()
                );
                return Ok(());
            }
            // Published once the replacement settles, never mid-reload
            self.state.write().await.detach(current);
            if let Err(e) = current.destroy().await {
                self.bump_revision();
                return Err(e.context(format!("destroying {} for reload", current.unique_id())));
            }
        }

        let plugin = match &current {
            Some(current) => current.owning_plugin().map(str::to_string),
            None => self.source_plugins.get(&path).and_then(|p| p.value().clone()),
        };
        let descriptor = match self.read_descriptor(&path, plugin.as_deref()) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                if current.is_some() {
                    self.bump_revision();
                }
                return Err(e);
            }
        };
        self.install(Arc::new(descriptor)).await?;
        Ok(())
    }

    /// Source deleted: cancel any pending reload, stop watching, unload the command
    pub async fn handle_file_deleted(&self, path: &Path) {
        let path = normalize_path(path);
        if let Some((_, pending)) = self.pending.remove(&path) {
            pending.handle.abort();
            debug!("Cancelled pending reload for {}", path.display());
        }
        if let Some(watcher) = self.watcher.get() {
            watcher.unwatch(&path);
        }
        self.source_plugins.remove(&path);

        let _gate = self.mutation.lock().await;
        let current = self.state.read().await.paths.get(&path).cloned();
        let Some(current) = current else {
            return;
        };
        if current.state() == CommandState::Destroying {
            return;
        }
        self.state.write().await.detach(&current);
        match current.destroy().await {
            Ok(()) => warn!(
                "🗑️ Unloaded {} because {} was deleted",
                current.unique_id(),
                path.display()
            ),
            Err(e) => error!("❌ Failed to destroy {}: {e:#}", current.unique_id()),
        }
        self.bump_revision();
    }

    /// Route watcher events until the channel closes or the registry shuts down
    pub fn spawn_watch_loop(
        self: &Arc<Self>,
        mut events: tokio::sync::mpsc::Receiver<FileEvent>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if registry.is_closed() {
                    break;
                }
                match event {
                    FileEvent::Added(path) => registry.handle_file_added(&path).await,
                    FileEvent::Changed(path) => registry.handle_file_changed(&path),
                    FileEvent::Removed(path) => registry.handle_file_deleted(&path).await,
                }
            }
            debug!("File event loop stopped");
        })
    }

    /// Cancel pending reloads and destroy every live command
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let paths: Vec<PathBuf> = self.pending.iter().map(|p| p.key().clone()).collect();
        for path in paths {
            if let Some((_, pending)) = self.pending.remove(&path) {
                pending.handle.abort();
            }
        }

        let _gate = self.mutation.lock().await;
        let live = {
            let mut state = self.state.write().await;
            let live = state.all();
            *state = RegistryState::default();
            live
        };
        info!("🛑 Shutting down registry ({} command(s))", live.len());
        for descriptor in live {
            if let Err(e) = descriptor.destroy().await {
                error!("❌ Failed to destroy {}: {e:#}", descriptor.unique_id());
            }
        }
        // No revision bump: the uploaded command set stays registered on the platform
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading commands directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}

fn collect_command_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in sorted_entries(dir)? {
        if entry.is_dir() {
            collect_command_files(&entry, files)?;
        } else if is_command_file(&entry) {
            files.push(entry);
        }
    }
    Ok(())
}
