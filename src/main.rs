//! loopback-router CLI

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use loopback_router::audio::AudioSnapshot;
use loopback_router::backend::platform_backend;
use loopback_router::config::args::{Args, Command};
use loopback_router::config::AppConfig;
use loopback_router::device::VirtualCableFilter;
use loopback_router::CaptureEngine;

/// Meter refresh interval
const METER_INTERVAL: Duration = Duration::from_millis(100);
const METER_WIDTH: usize = 30;

fn main() -> Result<()> {
    let args = Args::parse();

    let (config, config_path) = load_config(&args)?;

    // Initialize logging
    init_logging(&args, &config)?;
    if let Some(path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    // Execute command
    match args.command.clone().unwrap_or_default() {
        Command::List { show_ids } => cmd_list(&config, show_ids),
        Command::Run {
            channels,
            capture,
            forward,
            cable,
            volume,
            duration,
        } => {
            let mut config = config;
            if let Some(channels) = channels {
                config.channels = channels;
            }
            if let Some(capture) = capture {
                config.capture_device = capture;
            }
            if let Some(forward) = forward {
                config.forward_device_id = forward;
                config.forward_to_virtual_cable = false;
            }
            if cable {
                config.forward_to_virtual_cable = true;
            }
            if let Some(volume) = volume {
                config.volume = volume;
            }
            cmd_run(&config, duration.map(Duration::from_secs))
        }
        Command::FindCable => cmd_find_cable(&config),
        Command::SampleConfig => {
            print!("{}", AppConfig::sample_config());
            Ok(())
        }
    }
}

fn load_config(args: &Args) -> Result<(AppConfig, Option<PathBuf>)> {
    match &args.config {
        Some(path) => {
            let config = AppConfig::load(path)?;
            Ok((config, Some(path.clone())))
        }
        None => Ok(AppConfig::load_default()?),
    }
}

fn init_logging(args: &Args, config: &AppConfig) -> Result<()> {
    let level = args
        .log_level()
        .map(|level| level.to_string())
        .unwrap_or_else(|| config.log_level.clone());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let log_file = args.log.as_deref().or_else(|| config.log_file());
    if let Some(log_file) = log_file {
        let file = std::fs::File::create(log_file)
            .with_context(|| format!("Failed to create log file '{}'", log_file))?;
        subscriber.with_writer(file).init();
    } else {
        subscriber.init();
    }

    Ok(())
}

fn create_engine(config: &AppConfig) -> Result<CaptureEngine> {
    let backend = platform_backend()?;
    Ok(CaptureEngine::new(backend, config.to_engine_config()))
}

/// List active output devices
fn cmd_list(config: &AppConfig, show_ids: bool) -> Result<()> {
    let engine = create_engine(config)?;
    let devices = engine.enumerate_render_endpoints()?;

    if devices.is_empty() {
        println!("No output devices found.");
        return Ok(());
    }

    println!("Output devices:\n");

    for (i, device) in devices.iter().enumerate() {
        let cable_tag = if VirtualCableFilter::is_virtual_cable(&device.name) {
            " [virtual cable]"
        } else {
            ""
        };

        print!("  {}. {}{}", i + 1, device.name, cable_tag);

        if show_ids {
            println!("\n     ID: {}", device.id);
        } else {
            println!();
        }
    }

    println!();
    Ok(())
}

/// Print the ID of the installed virtual cable
fn cmd_find_cable(config: &AppConfig) -> Result<()> {
    let engine = create_engine(config)?;

    match engine.find_known_virtual_cable() {
        Some(id) => println!("{}", id),
        None => println!("No virtual audio cable found."),
    }

    Ok(())
}

/// Capture, forward and show the level until stopped
fn cmd_run(config: &AppConfig, duration: Option<Duration>) -> Result<()> {
    let mut engine = create_engine(config)?;

    if let Some(name) = config.capture_device() {
        if !engine.set_capture_device_by_name(name) {
            warn!("No output device matches '{}', capturing the default output", name);
        }
    }

    if config.forward_to_virtual_cable {
        match engine.find_known_virtual_cable() {
            Some(id) => engine.set_forward_device_id(Some(&id)),
            None => warn!("No virtual audio cable found, forwarding to the first other output"),
        }
    } else {
        engine.set_forward_device_id(config.forward_device_id());
    }

    // Setup Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    #[cfg(windows)]
    {
        let r = running.clone();
        let _ = ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        });
    }

    if let Err(e) = engine.init(config.channels).and_then(|()| engine.start()) {
        error!("Failed to start capture: {}", e);
        return Err(e.into());
    }

    if let (Some(device), Some(format)) = (engine.capture_device(), engine.format()) {
        println!("Capturing: {} [{}]", device.name, format);
    }
    match (engine.forward_device(), engine.forward_format()) {
        (Some(device), Some(format)) => println!("Forwarding: {} [{}]", device.name, format),
        _ => println!("Forwarding: off"),
    }
    println!("\nPress Ctrl+C to stop.\n");

    let cache = engine.latest_buffer_handle();
    let mut snapshot = AudioSnapshot::default();
    let started = Instant::now();

    while running.load(Ordering::SeqCst) {
        if duration.map_or(false, |d| started.elapsed() >= d) {
            break;
        }
        if cache.read_into(&mut snapshot) {
            print_meter(&snapshot);
        }
        std::thread::sleep(METER_INTERVAL);
    }
    println!();

    let stats = engine.stats();
    engine.stop()?;

    println!(
        "Stopped. {} packets captured ({} silent), {} forwarded, {} forward skips",
        stats.published_packets,
        stats.silent_packets,
        stats.forwarded_packets,
        stats.forward_skips
    );

    Ok(())
}

fn print_meter(snapshot: &AudioSnapshot) {
    let rms = snapshot.rms();
    let db = 20.0 * rms.max(1e-9).log10();
    // -60 dBFS..0 dBFS across the bar
    let filled = (((db + 60.0) / 60.0).clamp(0.0, 1.0) * METER_WIDTH as f32) as usize;

    print!(
        "\r  {:>6.1} dBFS  peak {:.2}  [{}{}]",
        db.max(-99.9),
        snapshot.peak(),
        "#".repeat(filled),
        " ".repeat(METER_WIDTH - filled)
    );
    let _ = std::io::stdout().flush();
}
