// crates/engine_shared/src/context.rs

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::bus::EventBus;
use crate::hash::{fnv1a, layout_fingerprint};
use crate::plugin_api::HostHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Where `HostContext::log` ends up.
///
/// A plugin module links its own copy of `tracing` with no subscriber
/// installed, so plugin code logs through this function pointer, which
/// always points back into the host binary.
pub type LogSink = fn(LogLevel, &str);

/// Forwards to `tracing`. Because the pointer is taken in the host when the
/// context is built, this runs against the host's subscriber.
pub fn tracing_sink(level: LogLevel, message: &str) {
    match level {
        LogLevel::Error => tracing::error!(target: "plugin", "{message}"),
        LogLevel::Warn => tracing::warn!(target: "plugin", "{message}"),
        LogLevel::Info => tracing::info!(target: "plugin", "{message}"),
        LogLevel::Debug => tracing::debug!(target: "plugin", "{message}"),
        LogLevel::Trace => tracing::trace!(target: "plugin", "{message}"),
    }
}

/// Simulation clock as seen by plugins.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    /// Number of completed fixed steps.
    pub frame: u64,
    /// Length of the last step, in seconds.
    pub dt: f32,
    /// Simulated time since start, in seconds.
    pub elapsed: f64,
}

/// A collaborator the host publishes in `Services`.
///
/// Like `Event::NAME`, `NAME` is what host and plugin builds agree on.
pub trait Service: Sized + 'static {
    const NAME: &'static str;
}

struct ServiceEntry {
    layout: u64,
    value: Rc<dyn Any>,
}

impl ServiceEntry {
    fn new<T: Service>(value: Rc<T>) -> Self {
        Self {
            layout: layout_fingerprint::<T>(T::NAME),
            value,
        }
    }

    fn cast<T: Service>(&self) -> Option<Rc<T>> {
        if self.layout != layout_fingerprint::<T>(T::NAME) {
            return None;
        }
        let raw = Rc::into_raw(Rc::clone(&self.value)).cast::<T>();
        // SAFETY: the entry was built from an `Rc` of a type with the same
        // name, size and alignment as `T`, i.e. from an `Rc<T>`.
        Some(unsafe { Rc::from_raw(raw) })
    }
}

/// Collaborators (window, gui layer, script interpreter, ...) keyed by
/// `Service::NAME`.
///
/// Only the host registers services: a value whose code lives in a plugin
/// module would dangle once that module is unloaded.
#[derive(Default)]
pub struct Services {
    entries: RefCell<HashMap<u64, ServiceEntry>>,
}

impl Services {
    /// Registers `service`, returning the one it replaced.
    pub fn insert<T: Service>(&self, service: Rc<T>) -> Option<Rc<T>> {
        self.entries
            .borrow_mut()
            .insert(fnv1a(T::NAME.as_bytes()), ServiceEntry::new(service))
            .and_then(|old| old.cast::<T>())
    }

    /// `None` if nothing is registered under `T::NAME`, or if the registered
    /// value has another layout.
    pub fn get<T: Service>(&self) -> Option<Rc<T>> {
        self.entries
            .borrow()
            .get(&fnv1a(T::NAME.as_bytes()))
            .and_then(ServiceEntry::cast::<T>)
    }

    pub fn remove<T: Service>(&self) -> Option<Rc<T>> {
        self.entries
            .borrow_mut()
            .remove(&fnv1a(T::NAME.as_bytes()))
            .and_then(|old| old.cast::<T>())
    }

    pub fn contains<T: Service>(&self) -> bool {
        self.entries
            .borrow()
            .contains_key(&fnv1a(T::NAME.as_bytes()))
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// The shared application context.
///
/// Created once by the host and handed to every plugin as an opaque
/// `HostHandle`. Plugins treat it as read-only; `advance` is for the host's
/// update loop.
pub struct HostContext {
    bus: Rc<EventBus>,
    time: Cell<FrameTime>,
    services: Services,
    log: LogSink,
}

impl HostContext {
    pub fn new() -> Self {
        Self::with_log_sink(tracing_sink)
    }

    pub fn with_log_sink(log: LogSink) -> Self {
        Self {
            bus: Rc::new(EventBus::new()),
            time: Cell::new(FrameTime::default()),
            services: Services::default(),
            log,
        }
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn time(&self) -> FrameTime {
        self.time.get()
    }

    /// Advances the clock by one fixed step and returns the new time.
    pub fn advance(&self, dt: f32) -> FrameTime {
        let mut time = self.time.get();
        time.frame += 1;
        time.dt = dt;
        time.elapsed += f64::from(dt);
        self.time.set(time);
        time
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        (self.log)(level, message)
    }

    /// The pointer handed across the module boundary.
    pub fn as_handle(&self) -> *const HostHandle {
        (self as *const Self).cast()
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("bus", &self.bus)
            .field("time", &self.time.get())
            .field("services", &self.services.len())
            .finish()
    }
}
