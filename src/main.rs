use sdapi_bridge::bridge::BridgeManager;
use sdapi_bridge::cli::Args;
use sdapi_bridge::config;
use sdapi_bridge::core::dispatch::ChannelDispatcher;
use sdapi_bridge::engine::LoopbackEngine;
use sdapi_bridge::settings::BridgeSettings;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::io::BufRead;
use std::sync::Arc;

fn init_logging(args: &Args, path_config: &config::PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("tiny_http", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("tiny_http", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Serve until `quit` on stdin. A closed stdin (daemon) serves until killed.
fn run_console(manager: &BridgeManager) {
    println!("Type 'status' or 'quit'.");
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        match line.trim() {
            "q" | "quit" | "exit" => return,
            "status" => println!(
                "{} ({} pending)",
                manager.status(),
                manager.pending().len()
            ),
            "" => {}
            other => println!("Unknown command: {}", other),
        }
    }
    debug!("stdin closed, serving until killed");
    loop {
        std::thread::park();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;

    info!("sdapi-bridge {} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(|| config::config_file(config::SETTINGS_FILE, &path_config));
    info!("Settings path: {}", settings_path.display());

    let mut settings = BridgeSettings::load(&settings_path)?;
    args.apply_to(&mut settings);
    if args.save_settings {
        settings.save(&settings_path)?;
    }

    let (dispatcher, jobs) = ChannelDispatcher::new();
    let manager = BridgeManager::new(Arc::new(dispatcher));
    manager.set_catalog(settings.catalog.clone());
    let _engine = LoopbackEngine::spawn(Arc::clone(manager.shared()), jobs, settings.engine())
        .context("Failed to spawn loopback engine")?;

    if !settings.bridge.enabled {
        warn!("Bridge disabled in {}", settings_path.display());
        println!("{}", manager.status());
        return Ok(());
    }

    manager
        .apply(&settings.bridge)
        .with_context(|| format!("Could not start API server on {}:{}", settings.bridge.address, settings.bridge.port))?;
    println!("{}", manager.status());

    run_console(&manager);
    manager.stop();
    info!("sdapi-bridge stopped");
    Ok(())
}
