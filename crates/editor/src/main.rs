// crates/editor/src/main.rs

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;
use engine_core::engine_shared::events::{BuildDockspace, BuildMenuBar, GuiRender};
use engine_core::{logging, Application, EngineConfig};
use tracing::{error, info};

/// Runs the engine host headless with a set of plugins.
#[derive(Parser, Debug)]
#[command(name = "editor", version, about)]
struct Cli {
    /// Engine config (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frames to run before shutting down; 0 runs until killed
    #[arg(short, long, default_value_t = 600)]
    frames: u64,

    /// Log filter, overrides the config; RUST_LOG overrides both
    #[arg(long)]
    log: Option<String>,

    /// Reload plugins when their module changes on disk
    #[arg(long)]
    hot_reload: bool,

    /// Extra plugin modules, installed after the configured ones
    plugins: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Error: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };
    config.plugins.paths.extend(cli.plugins.iter().cloned());
    if config.plugins.paths.is_empty() {
        config.plugins.paths.push(default_plugin_path());
    }
    if cli.hot_reload {
        config.plugins.hot_reload = true;
        config.plugins.shadow_copy = true;
    }

    logging::init(cli.log.as_deref().unwrap_or(&config.log.filter));

    let mut app = match Application::new(config) {
        Ok(app) => app,
        Err(err) => {
            error!(error = %err, "Failed to create application");
            return ExitCode::FAILURE;
        }
    };

    if app.install_configured() == 0 {
        error!("No plugin could be installed");
        return ExitCode::FAILURE;
    }

    app.start();
    let frame_budget = Duration::from_secs_f32(app.config().simulation.fixed_dt);
    let mut frame = 0u64;
    while cli.frames == 0 || frame < cli.frames {
        app.tick();
        app.publish(&BuildDockspace);
        app.publish(&BuildMenuBar);
        app.publish(&GuiRender);

        frame += 1;
        thread::sleep(frame_budget);
    }

    info!(frames = frame, "Shutting down");
    app.shutdown();
    ExitCode::SUCCESS
}

fn default_plugin_path() -> PathBuf {
    PathBuf::from("target/debug").join(format!(
        "{}game_plugin.{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_EXTENSION
    ))
}
