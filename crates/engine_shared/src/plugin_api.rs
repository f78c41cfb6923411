// crates/engine_shared/src/plugin_api.rs
use core::ffi::c_void;
use core::fmt;
use core::ops::Deref;
use core::ptr::NonNull;
use std::path::Path;

use crate::context::HostContext;
use crate::hash::fnv1a;

// ==================================================================================
// 1. OPAQUE HANDLES (The "Firewall")
// ==================================================================================

/// The host context as it crosses the module boundary.
///
/// Opaque (zero-sized, `!Send`/`!Sync`): the only thing a module may do with
/// it is turn it back into a `HostRef`.
#[repr(C)]
pub struct HostHandle {
    _data: [u8; 0],
    _marker: core::marker::PhantomData<(*mut u8, core::marker::PhantomPinned)>,
}

/// A plugin instance as the host sees it.
///
/// The host can move this pointer around but cannot read, drop or free what
/// it points to. Only the module's own detach entry point can.
#[repr(C)]
pub struct PluginObject {
    _data: [u8; 0],
    _marker: core::marker::PhantomData<(*mut u8, core::marker::PhantomPinned)>,
}

// ==================================================================================
// 2. ENTRY POINTS
// ==================================================================================

/// `engine_plugin_attach`: builds the plugin. Null means failure.
pub type AttachFn =
    unsafe extern "C" fn(host: *const HostHandle, user: *mut c_void) -> *mut PluginObject;

/// `engine_plugin_detach`: destroys a plugin previously returned by attach.
pub type DetachFn = unsafe extern "C" fn(host: *const HostHandle, plugin: *mut PluginObject);

pub const ATTACH_SYMBOL: &str = "engine_plugin_attach";
pub const DETACH_SYMBOL: &str = "engine_plugin_detach";

// ==================================================================================
// 3. IDENTITIES
// ==================================================================================

/// Stable identifier of an installed plugin: hash of its canonical path.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(u64);

impl PluginId {
    /// `path` is expected to be canonical already.
    pub fn from_path(path: &Path) -> Self {
        Self(fnv1a(path.as_os_str().as_encoded_bytes()))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PluginId({:016x})", self.0)
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Opaque pointer the installer hands to a plugin's attach entry point.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UserData(*mut c_void);

impl UserData {
    pub const fn null() -> Self {
        Self(core::ptr::null_mut())
    }

    pub const fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for UserData {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserData({:p})", self.0)
    }
}

// ==================================================================================
// 4. BACK-REFERENCE
// ==================================================================================

/// Non-owning reference from a plugin back to the host context.
#[derive(Clone, Copy)]
pub struct HostRef(NonNull<HostContext>);

impl HostRef {
    /// # Safety
    /// `handle` must be null or come from `HostContext::as_handle`, and that
    /// context must outlive every copy of the returned `HostRef`. The plugin
    /// manager guarantees this for the `HostRef`s held by installed plugins.
    pub unsafe fn from_handle(handle: *const HostHandle) -> Option<Self> {
        NonNull::new(handle.cast_mut().cast::<HostContext>()).map(Self)
    }

    pub fn handle(self) -> *const HostHandle {
        self.0.as_ptr().cast_const().cast()
    }
}

impl Deref for HostRef {
    type Target = HostContext;

    fn deref(&self) -> &HostContext {
        // SAFETY: upheld by the contract of `from_handle`.
        unsafe { self.0.as_ref() }
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostRef({:p})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_id_depends_only_on_the_path() {
        let a = PluginId::from_path(Path::new("/opt/plugins/libfoo.so"));
        let b = PluginId::from_path(Path::new("/opt/plugins/libfoo.so"));
        let c = PluginId::from_path(Path::new("/opt/plugins/libbar.so"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(format!("{a}").len(), 16);
    }

    #[test]
    fn host_ref_rejects_null() {
        assert!(unsafe { HostRef::from_handle(core::ptr::null()) }.is_none());
    }

    #[test]
    fn host_ref_derefs_to_the_context() {
        let ctx = HostContext::new();
        ctx.advance(1.0);
        let host = unsafe { HostRef::from_handle(ctx.as_handle()) }.expect("non-null");

        assert_eq!(host.time().frame, 1);
        assert_eq!(host.handle(), ctx.as_handle());
    }
}
