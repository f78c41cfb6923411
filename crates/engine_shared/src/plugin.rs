// crates/engine_shared/src/plugin.rs
//! Plugin side of the ABI: the `Plugin` trait, the base every instance is
//! wrapped in, and the attach/detach shims `export_plugin!` exports.

use core::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::bus::{EventBus, Listener};
use crate::context::{HostContext, LogLevel};
use crate::event::{EventListener, EventTypeId};
use crate::plugin_api::{HostHandle, HostRef, PluginObject, UserData};

/// What a plugin gets to see while it is being attached.
#[derive(Clone, Copy, Debug)]
pub struct PluginContext {
    host: HostRef,
    user: UserData,
}

impl PluginContext {
    pub fn host(&self) -> HostRef {
        self.host
    }

    pub fn user(&self) -> UserData {
        self.user
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        self.host.bus()
    }
}

/// An extension compiled into its own module.
///
/// Instances are only ever built by `attach_plugin` and destroyed by
/// `detach_plugin`, both running inside the module that defines the type.
pub trait Plugin: EventListener + Sized + 'static {
    const NAME: &'static str;

    /// Categories the plugin is subscribed to for as long as it is attached.
    const SUBSCRIPTIONS: &'static [EventTypeId];

    /// Builds the plugin. `None` makes the attach entry point return null.
    fn attach(ctx: &PluginContext) -> Option<Self>;

    /// Last call before the plugin is unsubscribed and dropped.
    fn detach(&self, _host: &HostContext) {}
}

/// The object behind a `PluginObject` pointer.
///
/// Registers the plugin on the bus when built; dropping it unsubscribes the
/// plugin from every category before the plugin itself is dropped.
pub struct PluginBase<P: Plugin> {
    listener: Listener<P>,
    host: HostRef,
    user: UserData,
}

impl<P: Plugin> PluginBase<P> {
    pub fn new(ctx: &PluginContext, plugin: P) -> Self {
        let listener = Listener::new(ctx.bus(), plugin);
        for &type_id in P::SUBSCRIPTIONS {
            listener.subscribe_id(type_id);
        }

        Self {
            listener,
            host: ctx.host,
            user: ctx.user,
        }
    }

    pub fn plugin(&self) -> &P {
        &self.listener
    }

    pub fn listener(&self) -> &Listener<P> {
        &self.listener
    }

    pub fn host(&self) -> HostRef {
        self.host
    }

    pub fn user(&self) -> UserData {
        self.user
    }
}

impl<P: Plugin> fmt::Debug for PluginBase<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginBase")
            .field("plugin", &P::NAME)
            .field("listener", &self.listener.id())
            .field("user", &self.user)
            .finish()
    }
}

/// Attach entry point for `P`. Never unwinds into the host.
///
/// # Safety
/// `host` must be null or a live `HostContext::as_handle` pointer that
/// outlives the returned plugin.
pub unsafe extern "C" fn attach_plugin<P: Plugin>(
    host: *const HostHandle,
    user: *mut c_void,
) -> *mut PluginObject {
    // SAFETY: forwarded from the caller.
    let Some(host) = (unsafe { HostRef::from_handle(host) }) else {
        return core::ptr::null_mut();
    };
    let ctx = PluginContext {
        host,
        user: UserData::new(user),
    };

    let built = panic::catch_unwind(AssertUnwindSafe(|| {
        P::attach(&ctx).map(|plugin| PluginBase::new(&ctx, plugin))
    }));

    match built {
        Ok(Some(base)) => Box::into_raw(Box::new(base)).cast(),
        Ok(None) => {
            host.log(LogLevel::Warn, &format!("plugin '{}' refused to attach", P::NAME));
            core::ptr::null_mut()
        }
        Err(_) => {
            host.log(LogLevel::Error, &format!("plugin '{}' panicked during attach", P::NAME));
            core::ptr::null_mut()
        }
    }
}

/// Detach entry point for `P`. Never unwinds into the host.
///
/// # Safety
/// `plugin` must be null or a pointer returned by `attach_plugin::<P>` that
/// has not been detached yet.
pub unsafe extern "C" fn detach_plugin<P: Plugin>(
    host: *const HostHandle,
    plugin: *mut PluginObject,
) {
    if plugin.is_null() {
        return;
    }
    // SAFETY: allocated by `attach_plugin::<P>` in this same module.
    let base = unsafe { Box::from_raw(plugin.cast::<PluginBase<P>>()) };
    let owner = base.host();

    let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
        base.plugin().detach(&base.host());
        drop(base);
    }));

    if outcome.is_err() {
        // SAFETY: forwarded from the caller; falls back to the base's own reference.
        let host = unsafe { HostRef::from_handle(host) }.unwrap_or(owner);
        host.log(LogLevel::Error, &format!("plugin '{}' panicked during detach", P::NAME));
    }
}

/// Exports `engine_plugin_attach` / `engine_plugin_detach` for a plugin type.
///
/// ```ignore
/// engine_shared::export_plugin!(MyPlugin);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($plugin:ty) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn engine_plugin_attach(
            host: *const $crate::plugin_api::HostHandle,
            user: *mut ::core::ffi::c_void,
        ) -> *mut $crate::plugin_api::PluginObject {
            unsafe { $crate::plugin::attach_plugin::<$plugin>(host, user) }
        }

        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn engine_plugin_detach(
            host: *const $crate::plugin_api::HostHandle,
            plugin: *mut $crate::plugin_api::PluginObject,
        ) {
            unsafe { $crate::plugin::detach_plugin::<$plugin>(host, plugin) }
        }

        const _: $crate::plugin_api::AttachFn = engine_plugin_attach;
        const _: $crate::plugin_api::DetachFn = engine_plugin_detach;
    };
}
