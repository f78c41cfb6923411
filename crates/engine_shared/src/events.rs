// crates/engine_shared/src/events.rs
//! Event taxonomy the host publishes. Plugins may define their own
//! categories next to these; only the `NAME`s have to stay unique.

use std::path::PathBuf;

use glam::Vec2;

use crate::event::Event;
use crate::plugin_api::PluginId;

// --- Lifecycle ---------------------------------------------------------------

/// Fired once when the application starts running.
#[derive(Clone, Copy, Debug, Default)]
pub struct Load;

/// Fired once when the application shuts down, before plugins are detached.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unload;

/// One fixed simulation step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Update {
    pub frame: u64,
    pub dt: f32,
}

#[derive(Clone, Debug)]
pub struct PluginInstalled {
    pub id: PluginId,
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct PluginUninstalled {
    pub id: PluginId,
    pub path: PathBuf,
}

impl Event for Load {
    const NAME: &'static str = "engine.lifecycle.load";
}

impl Event for Unload {
    const NAME: &'static str = "engine.lifecycle.unload";
}

impl Event for Update {
    const NAME: &'static str = "engine.lifecycle.update";
}

impl Event for PluginInstalled {
    const NAME: &'static str = "engine.plugin.installed";
}

impl Event for PluginUninstalled {
    const NAME: &'static str = "engine.plugin.uninstalled";
}

// --- Input -------------------------------------------------------------------

/// Platform-independent key code (the windowing collaborator's scan code).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyInput {
    pub key: KeyCode,
    pub pressed: bool,
    pub repeat: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MouseButtonInput {
    pub button: MouseButton,
    pub pressed: bool,
}

/// Cursor position in logical window pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CursorMoved {
    pub position: Vec2,
}

impl Event for KeyInput {
    const NAME: &'static str = "engine.input.key";
}

impl Event for MouseButtonInput {
    const NAME: &'static str = "engine.input.mouse_button";
}

impl Event for CursorMoved {
    const NAME: &'static str = "engine.input.cursor_moved";
}

// --- GUI phases --------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
pub struct BuildDockspace;

#[derive(Clone, Copy, Debug, Default)]
pub struct BuildMenuBar;

#[derive(Clone, Copy, Debug, Default)]
pub struct GuiRender;

impl Event for BuildDockspace {
    const NAME: &'static str = "engine.gui.dockspace";
}

impl Event for BuildMenuBar {
    const NAME: &'static str = "engine.gui.menu_bar";
}

impl Event for GuiRender {
    const NAME: &'static str = "engine.gui.render";
}
