//! BathyImg daemon entry point
//!
//! Loads configuration, wires the camera driver and image sink into the
//! acquisition coordinator, and runs until SIGINT/SIGTERM.

use bathyimg::app::AcquisitionApp;
use bathyimg::config::AppConfig;
use bathyimg::devices::{self, FsImageSink};
use bathyimg::error::Result;
use std::env;
use std::path::Path;
use std::sync::atomic::Ordering;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `bathyimg <path>` (positional)
/// - `bathyimg --config <path>` (flag-based)
/// - `bathyimg -c <path>` (short flag)
///
/// Defaults to `/etc/bathyimg.toml` if not specified.
fn parse_config_path(args: &[String]) -> String {
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "/etc/bathyimg.toml".to_string()
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let mock = args.iter().any(|a| a == "--mock");
    let config_path = parse_config_path(&args);

    let (config, config_found) = if Path::new(&config_path).exists() {
        (AppConfig::from_file(&config_path)?, true)
    } else {
        (AppConfig::default(), false)
    };

    // RUST_LOG still wins over the configured level
    let target = match config.logging.output.as_str() {
        "stderr" => env_logger::Target::Stderr,
        _ => env_logger::Target::Stdout,
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .target(target)
    .init();

    log::info!("BathyImg v{} starting...", env!("CARGO_PKG_VERSION"));
    if config_found {
        log::info!("Using config: {}", config_path);
    } else {
        log::info!("No config file at {}, using defaults", config_path);
    }

    let camera = devices::create_camera(&config.capture, mock)?;
    if mock {
        log::info!("Running with mock camera");
    }

    let mut app = AcquisitionApp::new(config, camera, Box::new(FsImageSink))?;

    let shutdown = app.shutdown_flag();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        shutdown.store(true, Ordering::Relaxed);
    })
    .map_err(|e| bathyimg::Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!("BathyImg running. Press Ctrl-C to stop.");
    app.run()?;

    log::info!("BathyImg stopped");
    Ok(())
}
