// crates/engine_core/src/module_loader.rs
//! Opening module images and resolving their exports.
//!
//! `PluginManager` only talks to the `ModuleLoader` trait, so tests can swap
//! the real dynamic loader for an in-process one.

use std::ffi::{c_void, OsStr};
use std::fs;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use libloading::Library;
use tracing::{debug, warn};

use crate::error::LoadError;

/// A module image kept resident until `close`.
pub trait LoadedModule: 'static {
    /// Address of an exported symbol, or `None` if the module has no such export.
    fn resolve_symbol(&self, name: &str) -> Option<NonNull<c_void>>;

    fn close(self) -> Result<(), LoadError>
    where
        Self: Sized;
}

pub trait ModuleLoader {
    type Module: LoadedModule;

    /// `path` is canonical.
    fn open(&self, path: &Path) -> Result<Self::Module, LoadError>;
}

/// Loads shared libraries through `libloading`.
///
/// With `shadow_copy` set, the file is copied next to the original under a
/// unique name and the copy is loaded instead. The original stays unlocked
/// so a build can overwrite it while the plugin runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct DylibLoader {
    shadow_copy: bool,
}

impl DylibLoader {
    pub fn new(shadow_copy: bool) -> Self {
        Self { shadow_copy }
    }

    pub fn shadow_copy(&self) -> bool {
        self.shadow_copy
    }
}

impl ModuleLoader for DylibLoader {
    type Module = DylibModule;

    fn open(&self, path: &Path) -> Result<DylibModule, LoadError> {
        fs::metadata(path).map_err(|source| LoadError::Missing {
            path: path.to_path_buf(),
            source,
        })?;

        let shadow = if self.shadow_copy {
            let copy = unique_copy_path(path);
            fs::copy(path, &copy).map_err(|source| LoadError::ShadowCopy {
                path: path.to_path_buf(),
                source,
            })?;
            Some(copy)
        } else {
            None
        };
        let load_path = shadow.as_deref().unwrap_or(path);

        // SAFETY: loading runs the module's initialisers. Only paths handed to
        // `PluginManager::install` get here; trusting them is the caller's call.
        let library = match unsafe { Library::new(load_path) } {
            Ok(library) => library,
            Err(source) => {
                if let Some(copy) = &shadow {
                    let _ = fs::remove_file(copy);
                }
                return Err(LoadError::Invalid {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        debug!(
            path = %path.display(),
            loaded_from = %load_path.display(),
            "Module opened"
        );

        Ok(DylibModule {
            library: Some(library),
            path: path.to_path_buf(),
            shadow,
        })
    }
}

pub struct DylibModule {
    library: Option<Library>,
    path: PathBuf,
    shadow: Option<PathBuf>,
}

impl DylibModule {
    /// The path the module was installed from, not the shadow copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn shadow_path(&self) -> Option<&Path> {
        self.shadow.as_deref()
    }

    fn release(&mut self) -> Result<(), libloading::Error> {
        let result = match self.library.take() {
            Some(library) => library.close(),
            None => Ok(()),
        };

        if let Some(copy) = self.shadow.take() {
            if let Err(err) = fs::remove_file(&copy) {
                warn!(path = %copy.display(), error = %err, "Failed to remove shadow copy");
            }
        }
        result
    }
}

impl LoadedModule for DylibModule {
    fn resolve_symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        let library = self.library.as_ref()?;
        // SAFETY: the symbol is read as a plain address and never called here.
        let symbol = unsafe { library.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        NonNull::new(*symbol)
    }

    fn close(mut self) -> Result<(), LoadError> {
        self.release().map_err(|source| LoadError::Close {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for DylibModule {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(path = %self.path.display(), error = %err, "Failed to close module");
        }
    }
}

static COPY_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_copy_path(original: &Path) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let n = COPY_COUNTER.fetch_add(1, Ordering::Relaxed);
    let stem = original
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("plugin");
    let ext = original
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or(std::env::consts::DLL_EXTENSION);
    original.with_file_name(format!("{stem}_loaded_{ts}_{n}.{ext}"))
}
