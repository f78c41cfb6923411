// crates/engine_core/src/plugin_manager.rs

use std::ffi::c_void;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::rc::Rc;

use engine_columns::Table;
use engine_shared::plugin_api::{
    AttachFn, DetachFn, PluginId, PluginObject, UserData, ATTACH_SYMBOL, DETACH_SYMBOL,
};
use engine_shared::HostContext;
use tracing::{debug, error, info, warn};

use crate::error::{LoadError, PluginError};
use crate::module_loader::{DylibLoader, LoadedModule, ModuleLoader};

// ==================================================================================
// REGISTRY COLUMNS
// ==================================================================================

/// Canonical path a plugin was installed from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginPath(pub PathBuf);

/// Open module image; emptied while the row is torn down.
pub struct ModuleSlot<M>(Option<M>);

/// Plugin instance returned by the attach entry point.
pub struct PluginSlot(Option<NonNull<PluginObject>>);

#[derive(Clone, Copy)]
pub struct EntryPoints {
    attach: AttachFn,
    detach: DetachFn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PluginState {
    /// Module open, attach not returned yet.
    Loading,
    Attached,
    /// Detach entry point running.
    Detaching,
}

type PluginRow<M> = (
    PluginId,
    PluginPath,
    ModuleSlot<M>,
    PluginSlot,
    EntryPoints,
    PluginState,
    UserData,
);

// ==================================================================================
// MANAGER
// ==================================================================================

/// Owns every installed plugin.
///
/// The manager keeps the `HostContext` alive for as long as any plugin is
/// attached. Dropping it uninstalls everything.
pub struct PluginManager<L: ModuleLoader = DylibLoader> {
    loader: L,
    host: Rc<HostContext>,
    rows: Table,
}

impl<L: ModuleLoader> PluginManager<L> {
    pub fn new(loader: L, host: Rc<HostContext>) -> Self {
        Self {
            loader,
            host,
            rows: Table::for_row::<PluginRow<L::Module>>(),
        }
    }

    pub fn host(&self) -> &Rc<HostContext> {
        &self.host
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Loads the module at `path` and attaches the plugin it exports.
    ///
    /// On any failure the registry is left exactly as it was.
    pub fn install(&mut self, path: &Path, user: UserData) -> Result<PluginId, PluginError> {
        let canonical = canonicalize(path)?;
        let id = PluginId::from_path(&canonical);

        if self.rows.find_by(&id).is_some() {
            warn!(plugin_id = %id, path = %canonical.display(), "Plugin already installed");
            return Err(PluginError::Duplicate {
                path: canonical,
                id,
            });
        }

        let module = self.loader.open(&canonical)?;

        let entry_points = match resolve_entry_points(&module) {
            Ok(entry_points) => entry_points,
            Err(symbol) => {
                close_module(&canonical, module);
                return Err(PluginError::Symbol {
                    path: canonical,
                    symbol,
                });
            }
        };

        self.rows.push_row((
            id,
            PluginPath(canonical.clone()),
            ModuleSlot(Some(module)),
            PluginSlot(None),
            entry_points,
            PluginState::Loading,
            user,
        ))?;

        // SAFETY: the export matches `AttachFn` by contract, and `self.host`
        // outlives the plugin because rows are torn down before it is dropped.
        let raw = unsafe { (entry_points.attach)(self.host.as_handle(), user.as_ptr()) };

        let Some(plugin) = NonNull::new(raw) else {
            error!(plugin_id = %id, path = %canonical.display(), "Plugin attach failed");
            self.remove_row(id);
            return Err(PluginError::Attach { path: canonical });
        };

        if let Some(position) = self.rows.find_by(&id) {
            if let Some(slot) = self.rows.at_mut::<PluginSlot>(position) {
                slot.0 = Some(plugin);
            }
            if let Some(state) = self.rows.at_mut::<PluginState>(position) {
                *state = PluginState::Attached;
            }
        }

        info!(plugin_id = %id, path = %canonical.display(), "Plugin installed");
        Ok(id)
    }

    /// Detaches and unloads a plugin. Returns `false` if `id` is not installed.
    pub fn uninstall(&mut self, id: PluginId) -> bool {
        let Some(position) = self.rows.find_by(&id) else {
            debug!(plugin_id = %id, "Uninstall ignored, plugin not installed");
            return false;
        };

        if let Some(state) = self.rows.at_mut::<PluginState>(position) {
            *state = PluginState::Detaching;
        }
        let plugin = self
            .rows
            .at_mut::<PluginSlot>(position)
            .and_then(|slot| slot.0.take());
        let entry_points = self.rows.at::<EntryPoints>(position).copied();

        if let (Some(plugin), Some(entry_points)) = (plugin, entry_points) {
            // SAFETY: `plugin` came from this module's attach and is detached once.
            unsafe { (entry_points.detach)(self.host.as_handle(), plugin.as_ptr()) };
        }

        let path = self.remove_row(id);
        info!(plugin_id = %id, path = %path.display(), "Plugin uninstalled");
        true
    }

    /// Uninstalls every plugin, most recently installed first.
    pub fn clear(&mut self) -> usize {
        let mut removed = 0;
        while let Some(id) = self.last_id() {
            if !self.uninstall(id) {
                break;
            }
            removed += 1;
        }
        removed
    }

    /// Whether the module at `path` is installed. Unresolvable paths are not.
    pub fn has(&self, path: &Path) -> bool {
        self.id_of(path).is_some()
    }

    pub fn id_of(&self, path: &Path) -> Option<PluginId> {
        let canonical = fs::canonicalize(path).ok()?;
        let id = PluginId::from_path(&canonical);
        self.rows.find_by(&id).map(|_| id)
    }

    pub fn contains(&self, id: PluginId) -> bool {
        self.rows.find_by(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Installed ids, in registry order. Removal reorders the registry.
    pub fn ids(&self) -> Vec<PluginId> {
        self.rows
            .column::<PluginId>()
            .map(<[PluginId]>::to_vec)
            .unwrap_or_default()
    }

    pub fn last_id(&self) -> Option<PluginId> {
        self.rows.column::<PluginId>()?.last().copied()
    }

    pub fn path(&self, id: PluginId) -> Result<&Path, PluginError> {
        self.rows
            .find_by(&id)
            .and_then(|position| self.rows.at::<PluginPath>(position))
            .map(|path| path.0.as_path())
            .ok_or(PluginError::NotFound(id))
    }

    pub fn state(&self, id: PluginId) -> Option<PluginState> {
        let position = self.rows.find_by(&id)?;
        self.rows.at::<PluginState>(position).copied()
    }

    pub fn user_data(&self, id: PluginId) -> Option<UserData> {
        let position = self.rows.find_by(&id)?;
        self.rows.at::<UserData>(position).copied()
    }

    /// Erases the row for `id` and closes its module. Returns the plugin path.
    fn remove_row(&mut self, id: PluginId) -> PathBuf {
        let Some(position) = self.rows.find_by(&id) else {
            return PathBuf::new();
        };
        let module = self
            .rows
            .at_mut::<ModuleSlot<L::Module>>(position)
            .and_then(|slot| slot.0.take());
        let path = self
            .rows
            .at::<PluginPath>(position)
            .map(|path| path.0.clone())
            .unwrap_or_default();

        self.rows.erase(position);
        if let Some(module) = module {
            close_module(&path, module);
        }
        path
    }
}

impl<L: ModuleLoader> Drop for PluginManager<L> {
    fn drop(&mut self) {
        let removed = self.clear();
        if removed > 0 {
            debug!(removed, "Plugin manager dropped with plugins installed");
        }
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, LoadError> {
    fs::canonicalize(path).map_err(|source| LoadError::Missing {
        path: path.to_path_buf(),
        source,
    })
}

fn resolve_entry_points<M: LoadedModule>(module: &M) -> Result<EntryPoints, &'static str> {
    let attach = module.resolve_symbol(ATTACH_SYMBOL).ok_or(ATTACH_SYMBOL)?;
    let detach = module.resolve_symbol(DETACH_SYMBOL).ok_or(DETACH_SYMBOL)?;

    // SAFETY: the two export names are reserved for exactly these signatures.
    // Nothing about the signature can be checked at runtime.
    unsafe {
        Ok(EntryPoints {
            attach: mem::transmute::<*mut c_void, AttachFn>(attach.as_ptr()),
            detach: mem::transmute::<*mut c_void, DetachFn>(detach.as_ptr()),
        })
    }
}

fn close_module<M: LoadedModule>(path: &Path, module: M) {
    if let Err(err) = module.close() {
        warn!(path = %path.display(), error = %err, "Failed to close module");
    }
}
