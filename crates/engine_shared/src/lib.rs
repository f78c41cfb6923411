// crates/engine_shared/src/lib.rs
//! Types shared by the host and every plugin module: the event bus, the host
//! context and the plugin ABI.

pub mod bus;
pub mod context;
pub mod event;
pub mod events;
pub mod hash;
pub mod plugin;
pub mod plugin_api;

pub use bus::{EventBus, Listener};
pub use context::{FrameTime, HostContext, LogLevel, LogSink, Service, Services};
pub use event::{Event, EventListener, EventRef, EventTypeId, ListenerId};
pub use plugin::{Plugin, PluginBase, PluginContext};
pub use plugin_api::{
    AttachFn, DetachFn, HostHandle, HostRef, PluginId, PluginObject, UserData, ATTACH_SYMBOL,
    DETACH_SYMBOL,
};
