// crates/engine_core/src/config.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_FIXED_DT: f32 = 1.0 / 60.0;
pub const DEFAULT_MAX_STEPS_PER_FRAME: u32 = 5;
pub const DEFAULT_RELOAD_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Engine configuration as read from TOML. Every section may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub plugins: PluginConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Modules installed at startup. Relative paths resolve against the
    /// directory of the config file.
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Load a copy of each module so the original can be rebuilt in place.
    #[serde(default)]
    pub shadow_copy: bool,

    /// Reinstall a plugin when its module changes on disk.
    #[serde(default)]
    pub hot_reload: bool,

    #[serde(default = "default_reload_debounce_ms")]
    pub reload_debounce_ms: u64,
}

impl PluginConfig {
    pub fn reload_debounce(&self) -> Duration {
        Duration::from_millis(self.reload_debounce_ms)
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            shadow_copy: false,
            hot_reload: false,
            reload_debounce_ms: DEFAULT_RELOAD_DEBOUNCE_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Fixed step length, in seconds
    #[serde(default = "default_fixed_dt")]
    pub fixed_dt: f32,

    #[serde(default = "default_max_steps_per_frame")]
    pub max_steps_per_frame: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fixed_dt: DEFAULT_FIXED_DT,
            max_steps_per_frame: DEFAULT_MAX_STEPS_PER_FRAME,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_reload_debounce_ms() -> u64 {
    DEFAULT_RELOAD_DEBOUNCE_MS
}

fn default_fixed_dt() -> f32 {
    DEFAULT_FIXED_DT
}

fn default_max_steps_per_frame() -> u32 {
    DEFAULT_MAX_STEPS_PER_FRAME
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(base) = path.parent() {
            config.rebase_plugin_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let dt = self.simulation.fixed_dt;
        if !dt.is_finite() || dt <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "simulation.fixed_dt must be a positive number of seconds, got {dt}"
            )));
        }
        if self.simulation.max_steps_per_frame == 0 {
            return Err(ConfigError::Invalid(
                "simulation.max_steps_per_frame must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn rebase_plugin_paths(&mut self, base: &Path) {
        for path in &mut self.plugins.paths {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = EngineConfig::default();
        assert!(config.plugins.paths.is_empty());
        assert!(!config.plugins.shadow_copy);
        assert!(!config.plugins.hot_reload);
        assert_eq!(config.plugins.reload_debounce(), Duration::from_millis(500));
        assert_eq!(config.simulation.fixed_dt, DEFAULT_FIXED_DT);
        assert_eq!(config.simulation.max_steps_per_frame, 5);
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [plugins]
            hot_reload = true

            [simulation]
            fixed_dt = 0.02
            "#,
        )
        .expect("valid config");

        assert!(config.plugins.hot_reload);
        assert_eq!(config.plugins.reload_debounce_ms, DEFAULT_RELOAD_DEBOUNCE_MS);
        assert_eq!(config.simulation.fixed_dt, 0.02);
        assert_eq!(config.simulation.max_steps_per_frame, DEFAULT_MAX_STEPS_PER_FRAME);
        assert_eq!(config.log.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_rejects_non_positive_step() {
        let err = EngineConfig::from_toml_str("[simulation]\nfixed_dt = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = EngineConfig::from_toml_str("[plugins\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_relative_plugin_paths_follow_the_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("engine.toml");
        fs::write(
            &config_path,
            "[plugins]\npaths = [\"plugins/libgame.so\", \"/abs/libtool.so\"]\n",
        )
        .expect("write config");

        let config = EngineConfig::from_file(&config_path).expect("loads");
        assert_eq!(config.plugins.paths[0], dir.path().join("plugins/libgame.so"));
        assert_eq!(config.plugins.paths[1], PathBuf::from("/abs/libtool.so"));
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let err = EngineConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
