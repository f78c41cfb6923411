// crates/engine_core/src/lib.rs
//! Host side of the engine: plugin manager, module loading, the fixed-step
//! loop and the `Application` that ties them together.

pub mod app;
pub mod config;
pub mod engine_loop;
pub mod error;
pub mod hot_reload;
pub mod logging;
pub mod module_loader;
pub mod plugin_manager;

// Re-export Application so the Editor crate can find it easily
pub use app::Application;
pub use config::EngineConfig;
pub use error::{ConfigError, EngineError, LoadError, PluginError};
pub use module_loader::{DylibLoader, LoadedModule, ModuleLoader};
pub use plugin_manager::{PluginManager, PluginState};

pub use engine_shared;
