//! `motionsvc` – operator shell for the motion service.
//!
//! The binary:
//!
//! 1. Initialises tracing (compact or JSON logs, optional OTLP export).
//! 2. Loads `~/.motionsvc/config.toml`, running a **First-Run Wizard** that
//!    writes the defaults and a starter cell when the file is absent.
//! 3. Builds a [`MotionService`] over the simulated device bench, connects
//!    every enabled device and drops into the interactive REPL.
//! 4. Intercepts **Ctrl-C**: cancels the running coordinated move, stops
//!    every device and exits.

mod config;
mod demo;
mod repl;

use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use motionsvc_hal::SimBackend;
use motionsvc_kernel::{JsonPositionStore, MotionKernel};
use motionsvc_runtime::MotionService;
use motionsvc_runtime::telemetry;
use tokio::runtime::Handle;
use tokio::sync::watch;

fn main() {
    // Tracing goes first; the OTLP exporter is built before any runtime.
    let _guard = telemetry::init_tracing("motionsvc");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cfg));
    // Stdin is read on a blocking thread that never returns on its own.
    runtime.shutdown_timeout(Duration::from_millis(100));
}

async fn run(cfg: config::Config) {
    let files = cfg.data_files(&config::config_dir());

    let backend = SimBackend::new();
    backend.set_motion_polls(cfg.sim_motion_polls);
    let kernel = MotionKernel::from_config_file(
        &files.devices,
        Arc::new(backend.factory()),
        Arc::new(JsonPositionStore::new(&files.positions)),
    );
    let service = Arc::new(MotionService::with_graph_file(kernel, &files.graphs));

    let total = service.devices().await.len();
    let connected = service.initialize_all().await;
    let summary = format!("{connected}/{total} device(s) connected");
    if connected == total {
        println!("  {}", summary.green());
    } else {
        println!("  {}", summary.yellow());
    }
    println!(
        "  {} routing graph(s) from {}",
        service.available_graphs().len(),
        files.graphs.display()
    );

    if let Some(speed) = cfg.default_speed {
        for device_id in service.kernel().connected_device_ids().await {
            if !service.set_speed(&device_id, speed).await {
                warn!(device = %device_id, speed, "default speed not applied");
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    install_ctrlc_handler(service.clone(), Handle::current(), shutdown_tx);

    println!("\n  Type {} for available commands.\n", "/help".bold());
    repl::run(service.clone(), shutdown_rx, cfg.monitor_interval()).await;

    service.stop_all().await;
    service.shutdown().await;
    println!("{}", "  ✓ All devices stopped and disconnected.".green());
}

/// The handler runs on its own thread, so it can block on the runtime to
/// stop the devices before telling the REPL to leave.
fn install_ctrlc_handler(service: Arc<MotionService>, handle: Handle, shutdown: watch::Sender<bool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping all motion …".yellow().bold());
        if service.cancel_operation() {
            println!("{}", "  ✓ Coordinated operation cancelled.".green());
        }
        if handle.block_on(service.stop_all()) {
            println!("{}", "  ✓ All devices stopped.".green());
        } else {
            println!("{}", "  ✗ Some devices did not confirm the stop.".red());
        }
        let _ = shutdown.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not stop the devices");
    }
}

fn print_banner() {
    println!();
    println!("{}", "  ┌──────────────────────────────────────┐".cyan());
    println!("{}", "  │   motionsvc · multi-device motion    │".cyan().bold());
    println!("{}", "  └──────────────────────────────────────┘".cyan());
    println!();
}

fn run_first_run_wizard() -> config::Config {
    println!("{}", "  First run: no configuration found.".yellow().bold());

    let dir = config::config_dir();
    let mut cfg = config::Config::default();

    match config::save(&cfg) {
        Ok(()) => println!(
            "  Wrote defaults to {}",
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("  {}: {}", "Could not save config".red(), e),
    }

    // Seed before env overrides so the starter cell lands in the vault.
    seed_starter_cell(&cfg, &dir);
    config::apply_env_overrides(&mut cfg);
    cfg
}

fn seed_starter_cell(cfg: &config::Config, dir: &Path) {
    match demo::seed_missing(&cfg.data_files(dir)) {
        Ok(written) => {
            for path in written {
                println!("  Seeded {}", path.display().to_string().dimmed());
            }
        }
        Err(e) => println!("  {}: {}", "Could not seed starter cell".red(), e),
    }
}
