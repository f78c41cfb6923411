// crates/engine_core/tests/common/mod.rs
//! In-process stand-in for the dynamic loader. "Modules" are empty files on
//! disk (so paths canonicalize) whose exports are real attach/detach shims.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::fs;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::rc::Rc;

use engine_core::error::LoadError;
use engine_core::{LoadedModule, ModuleLoader};
use engine_shared::events::{Load, Unload, Update};
use engine_shared::plugin::{attach_plugin, detach_plugin};
use engine_shared::plugin_api::{AttachFn, DetachFn, ATTACH_SYMBOL, DETACH_SYMBOL};
use engine_shared::{
    Event, EventListener, EventRef, EventTypeId, HostContext, Plugin, PluginContext, UserData,
};
use tempfile::TempDir;

#[derive(Clone, Copy, Default)]
pub struct Exports {
    pub attach: Option<AttachFn>,
    pub detach: Option<DetachFn>,
}

impl Exports {
    pub fn of<P: Plugin>() -> Self {
        Self {
            attach: Some(attach_plugin::<P>),
            detach: Some(detach_plugin::<P>),
        }
    }

    pub fn without_attach<P: Plugin>() -> Self {
        Self {
            attach: None,
            ..Self::of::<P>()
        }
    }

    pub fn without_detach<P: Plugin>() -> Self {
        Self {
            detach: None,
            ..Self::of::<P>()
        }
    }
}

#[derive(Default)]
pub struct Shelf {
    exports: RefCell<HashMap<PathBuf, Exports>>,
    opened: Cell<usize>,
    closed: Cell<usize>,
}

impl Shelf {
    pub fn opened(&self) -> usize {
        self.opened.get()
    }

    pub fn closed(&self) -> usize {
        self.closed.get()
    }

    pub fn resident(&self) -> usize {
        self.opened.get() - self.closed.get()
    }
}

#[derive(Clone, Default)]
pub struct FakeLoader {
    pub shelf: Rc<Shelf>,
}

pub struct FakeModule {
    exports: Exports,
    shelf: Rc<Shelf>,
}

impl ModuleLoader for FakeLoader {
    type Module = FakeModule;

    fn open(&self, path: &Path) -> Result<FakeModule, LoadError> {
        let exports = self.shelf.exports.borrow().get(path).copied().ok_or_else(|| {
            LoadError::Rejected {
                path: path.to_path_buf(),
                reason: "not on the shelf".to_string(),
            }
        })?;
        self.shelf.opened.set(self.shelf.opened.get() + 1);

        Ok(FakeModule {
            exports,
            shelf: Rc::clone(&self.shelf),
        })
    }
}

impl LoadedModule for FakeModule {
    fn resolve_symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        let address = match name {
            ATTACH_SYMBOL => self.exports.attach.map(|f| f as *const ()),
            DETACH_SYMBOL => self.exports.detach.map(|f| f as *const ()),
            _ => None,
        }?;
        NonNull::new(address.cast_mut().cast())
    }

    fn close(self) -> Result<(), LoadError> {
        self.shelf.closed.set(self.shelf.closed.get() + 1);
        Ok(())
    }
}

/// A temp directory of fake module files plus the loader that knows them.
pub struct Fixture {
    pub dir: TempDir,
    pub loader: FakeLoader,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            loader: FakeLoader::default(),
        }
    }

    pub fn shelf(&self) -> Rc<Shelf> {
        Rc::clone(&self.loader.shelf)
    }

    /// Creates `name` on disk and registers its exports. Returns the
    /// canonical path.
    pub fn module(&self, name: &str, exports: Exports) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, b"").expect("write module file");
        let canonical = fs::canonicalize(&path).expect("canonicalize");
        self.loader
            .shelf
            .exports
            .borrow_mut()
            .insert(canonical.clone(), exports);
        canonical
    }

    /// A path inside the fixture directory that was never created.
    pub fn missing(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

// --- Test plugins ------------------------------------------------------------

/// Lines a `Recorder` writes; handed over as the plugin's user data.
#[derive(Default)]
pub struct Journal(RefCell<Vec<String>>);

impl Journal {
    pub fn leak() -> &'static Journal {
        Box::leak(Box::default())
    }

    pub fn user_data(&'static self) -> UserData {
        UserData::new((self as *const Journal).cast_mut().cast())
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn count(&self, line: &str) -> usize {
        self.0.borrow().iter().filter(|l| *l == line).count()
    }

    fn push(&self, line: impl Into<String>) {
        self.0.borrow_mut().push(line.into());
    }
}

/// Writes every lifecycle event it hears into its `Journal`.
/// Refuses to attach without one.
pub struct Recorder {
    journal: &'static Journal,
}

impl EventListener for Recorder {
    fn on_event(&self, event: &EventRef<'_>) {
        if let Some(update) = event.get::<Update>() {
            self.journal.push(format!("update {}", update.frame));
        } else if event.is::<Load>() {
            self.journal.push("load");
        } else if event.is::<Unload>() {
            self.journal.push("unload");
        }
    }
}

impl Plugin for Recorder {
    const NAME: &'static str = "recorder";
    const SUBSCRIPTIONS: &'static [EventTypeId] = &[Load::ID, Update::ID, Unload::ID];

    fn attach(ctx: &PluginContext) -> Option<Self> {
        if ctx.user().is_null() {
            return None;
        }
        // SAFETY: tests only pass `Journal::user_data` pointers.
        let journal = unsafe { &*ctx.user().as_ptr().cast::<Journal>() };
        journal.push("attach");
        Some(Self { journal })
    }

    fn detach(&self, _host: &HostContext) {
        self.journal.push("detach");
    }
}

/// Attaches unconditionally and listens to nothing.
pub struct Quiet;

impl EventListener for Quiet {
    fn on_event(&self, _event: &EventRef<'_>) {}
}

impl Plugin for Quiet {
    const NAME: &'static str = "quiet";
    const SUBSCRIPTIONS: &'static [EventTypeId] = &[];

    fn attach(_ctx: &PluginContext) -> Option<Self> {
        Some(Self)
    }
}
