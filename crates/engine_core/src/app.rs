// crates/engine_core/src/app.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use engine_shared::events::{Load, PluginInstalled, PluginUninstalled, Unload};
use engine_shared::plugin_api::{PluginId, UserData};
use engine_shared::{Event, EventBus, HostContext};
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::engine_loop::EngineLoop;
use crate::error::{EngineError, PluginError};
use crate::hot_reload::HotReloader;
use crate::module_loader::{DylibLoader, ModuleLoader};
use crate::plugin_manager::PluginManager;

/// The host: owns the shared context and the plugin manager, and drives the
/// lifecycle events plugins subscribe to.
pub struct Application<L: ModuleLoader = DylibLoader> {
    plugins: PluginManager<L>,
    context: Rc<HostContext>,
    engine_loop: EngineLoop,
    reloader: Option<HotReloader>,
    /// Modules whose reload failed, with the user data to reinstall them
    /// with. Still watched; retried on their next change.
    pending_reloads: HashMap<PathBuf, UserData>,
    config: EngineConfig,
    running: bool,
}

impl Application<DylibLoader> {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let loader = DylibLoader::new(config.plugins.shadow_copy);
        Self::with_loader(loader, config)
    }
}

impl<L: ModuleLoader> Application<L> {
    pub fn with_loader(loader: L, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let context = Rc::new(HostContext::new());
        let reloader = if config.plugins.hot_reload {
            Some(HotReloader::new(config.plugins.reload_debounce())?)
        } else {
            None
        };

        Ok(Self {
            plugins: PluginManager::new(loader, Rc::clone(&context)),
            engine_loop: EngineLoop::new(
                config.simulation.fixed_dt,
                config.simulation.max_steps_per_frame,
            ),
            context,
            reloader,
            pending_reloads: HashMap::new(),
            config,
            running: false,
        })
    }

    pub fn context(&self) -> &Rc<HostContext> {
        &self.context
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        self.context.bus()
    }

    pub fn plugins(&self) -> &PluginManager<L> {
        &self.plugins
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Forwards a host event (input, gui phase, ...) to every subscriber.
    pub fn publish<E: Event>(&self, event: &E) -> usize {
        self.context.bus().publish(event)
    }

    pub fn install(
        &mut self,
        path: impl AsRef<Path>,
        user: UserData,
    ) -> Result<PluginId, PluginError> {
        let id = self.plugins.install(path.as_ref(), user)?;
        let path = self.plugins.path(id)?.to_path_buf();

        if let Some(reloader) = &mut self.reloader {
            if let Err(err) = reloader.watch(&path) {
                warn!(plugin_id = %id, error = %err, "Hot reload unavailable for plugin");
            }
        }

        self.publish(&PluginInstalled { id, path });
        Ok(id)
    }

    pub fn uninstall(&mut self, id: PluginId) -> bool {
        let Ok(path) = self.plugins.path(id).map(Path::to_path_buf) else {
            return false;
        };
        if !self.plugins.uninstall(id) {
            return false;
        }

        if let Some(reloader) = &mut self.reloader {
            reloader.unwatch(&path);
        }
        self.publish(&PluginUninstalled { id, path });
        true
    }

    /// Installs every path from `[plugins] paths`, in order. Failures are
    /// logged and skipped. Returns how many plugins were installed.
    pub fn install_configured(&mut self) -> usize {
        let paths: Vec<PathBuf> = self.config.plugins.paths.clone();
        let mut installed = 0;

        for path in &paths {
            match self.install(path, UserData::null()) {
                Ok(_) => installed += 1,
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Failed to install configured plugin")
                }
            }
        }

        info!(installed, configured = paths.len(), "Configured plugins installed");
        installed
    }

    /// Uninstalls `id` and installs the same module again with the same user data.
    ///
    /// The module stays watched either way. If the install fails the path is
    /// kept as a pending reload and `poll_hot_reload` retries it on the next
    /// change, the way a half-written build is followed by a complete one.
    pub fn reload(&mut self, id: PluginId) -> Result<PluginId, PluginError> {
        let path = self.plugins.path(id)?.to_path_buf();
        let user = self.plugins.user_data(id).unwrap_or_default();

        info!(plugin_id = %id, path = %path.display(), "Reloading plugin");
        if self.plugins.uninstall(id) {
            self.publish(&PluginUninstalled {
                id,
                path: path.clone(),
            });
        }
        self.reinstall(path, user)
    }

    /// Paths whose last reload failed and that will be retried.
    pub fn pending_reloads(&self) -> impl Iterator<Item = &Path> {
        self.pending_reloads.keys().map(PathBuf::as_path)
    }

    pub fn is_reload_pending(&self, path: &Path) -> bool {
        self.pending_reloads.contains_key(path)
    }

    /// Reloads every watched module that changed on disk, and retries the
    /// pending ones that changed. Returns how many plugins came back.
    pub fn poll_hot_reload(&mut self) -> usize {
        let Some(reloader) = &mut self.reloader else {
            return 0;
        };
        let changed = reloader.drain(Instant::now());

        let mut reloaded = 0;
        for path in changed {
            let outcome = if let Some(id) = self.plugins.id_of(&path) {
                self.reload(id)
            } else if let Some(user) = self.pending_reloads.get(&path).copied() {
                info!(path = %path.display(), "Retrying plugin reload");
                self.reinstall(path.clone(), user)
            } else {
                continue;
            };

            match outcome {
                Ok(_) => reloaded += 1,
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Hot reload failed, retrying on next change")
                }
            }
        }
        reloaded
    }

    fn reinstall(&mut self, path: PathBuf, user: UserData) -> Result<PluginId, PluginError> {
        match self.install(&path, user) {
            Ok(id) => {
                self.pending_reloads.remove(&path);
                Ok(id)
            }
            Err(err) => {
                self.pending_reloads.insert(path, user);
                Err(err)
            }
        }
    }

    /// Publishes `Load` once and starts the frame clock.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.engine_loop.reset();

        info!(plugins = self.plugins.len(), "Application started");
        self.publish(&Load);
    }

    /// Advances the simulation by `frame_dt` seconds. Returns the number of
    /// `Update`s published.
    pub fn update(&mut self, frame_dt: f32) -> u32 {
        if !self.running {
            return 0;
        }
        self.engine_loop.update_simulation(frame_dt, &self.context)
    }

    /// One frame against the wall clock: hot reload first, then simulation.
    pub fn tick(&mut self) -> u32 {
        let frame_dt = self.engine_loop.tick_timer();
        self.poll_hot_reload();
        self.update(frame_dt)
    }

    /// Publishes `Unload` (if started) and uninstalls every plugin.
    pub fn shutdown(&mut self) {
        if self.running {
            self.running = false;
            self.publish(&Unload);
        }

        let mut removed = 0;
        while let Some(id) = self.plugins.last_id() {
            if !self.uninstall(id) {
                break;
            }
            removed += 1;
        }
        // Anything `uninstall` could not reach.
        removed += self.plugins.clear();

        for (path, _) in self.pending_reloads.drain() {
            if let Some(reloader) = &mut self.reloader {
                reloader.unwatch(&path);
            }
        }

        if removed > 0 {
            info!(removed, "Application shut down");
        }
    }
}

impl<L: ModuleLoader> Drop for Application<L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
