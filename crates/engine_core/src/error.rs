// crates/engine_core/src/error.rs

use std::io;
use std::path::PathBuf;

use engine_columns::TableError;
use engine_shared::PluginId;
use thiserror::Error;

/// Failure to open or close a module image.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("module '{}' not found", path.display())]
    Missing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{}' is not a loadable module", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("'{}' was rejected by the loader: {reason}", path.display())]
    Rejected { path: PathBuf, reason: String },

    #[error("failed to create a shadow copy of '{}'", path.display())]
    ShadowCopy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to close module '{}'", path.display())]
    Close {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("module '{}' does not export '{symbol}'", path.display())]
    Symbol { path: PathBuf, symbol: &'static str },

    #[error("attach entry point of '{}' returned null", path.display())]
    Attach { path: PathBuf },

    #[error("'{}' is already installed as plugin {id}", path.display())]
    Duplicate { path: PathBuf, id: PluginId },

    #[error("no plugin with id {0}")]
    NotFound(PluginId),

    #[error("plugin registry rejected the row: {0}")]
    Registry(#[from] TableError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config '{}'", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("failed to start the plugin file watcher")]
    Watch(#[from] notify::Error),
}
