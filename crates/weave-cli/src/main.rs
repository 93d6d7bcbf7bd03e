//! `weave` – starts one Weave process.
//!
//! ```text
//! weave [LAUNCH_FILE]
//! ```
//!
//! 1. Loads `~/.weave/config.toml` (written with defaults on first run) and
//!    applies `WEAVE_*` overrides.
//! 2. Loads the launch file given on the command line, or the configured
//!    one, and folds the config into its `runtime` action.
//! 3. Builds the runtime, installs the WebSocket connector, applies the
//!    launch description and serves the gateway port.
//! 4. Ctrl-C stops every local service and exits; a second Ctrl-C exits
//!    immediately.

mod bootstrap;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use weave_core::services::runtime::RuntimeConfig;
use weave_core::telemetry::init_tracing;
use weave_core::{BuiltinCatalog, Runtime};
use weave_gateway::{GatewayServer, WsConnector};
use weave_types::{LaunchDescription, WeaveError};

use config::Config;

fn main() {
    print_banner();

    let cfg = load_config();

    let launch_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| cfg.launch.clone());
    let mut ld = match &launch_path {
        Some(path) => match bootstrap::load_launch(path) {
            Ok(ld) => {
                println!("  Launch file {}", path.display().to_string().bold());
                ld
            }
            Err(e) => fail(&format!("cannot load launch file: {e}")),
        },
        None => LaunchDescription::default(),
    };

    let settings = match bootstrap::runtime_settings(&cfg, &mut ld) {
        Ok(settings) => settings,
        Err(e) => fail(&e.to_string()),
    };

    let _tracer = init_tracing("weave", &settings.log_level);

    // ── Shutdown signal ───────────────────────────────────────────────────
    let stop = Arc::new(Notify::new());
    let stopping = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        let stopping = Arc::clone(&stopping);
        if let Err(e) = ctrlc::set_handler(move || {
            if stopping.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
            println!();
            println!("{}", "⚠  Ctrl-C received – stopping services …".yellow().bold());
            stop.notify_one();
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
        }
    }

    let tokio_rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => fail(&format!("cannot start tokio runtime: {e}")),
    };

    if let Err(e) = tokio_rt.block_on(serve(&cfg, &ld, &settings, stop)) {
        error!(error = %e, "process stopped with an error");
        fail(&e.to_string());
    }
    println!("{}", "  ✓ Exiting Weave.".green());
}

fn load_config() -> Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  Wrote default config to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Config error".red(), e),
            }
            with_overrides(cfg)
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            with_overrides(Config::default())
        }
    }
}

fn with_overrides(mut cfg: Config) -> Config {
    config::apply_env_overrides(&mut cfg);
    cfg
}

async fn serve(
    cfg: &Config,
    ld: &LaunchDescription,
    settings: &RuntimeConfig,
    stop: Arc<Notify>,
) -> Result<(), WeaveError> {
    let mut catalog = BuiltinCatalog::new();
    if let Some(path) = &cfg.catalog
        && let Err(e) = catalog.extend_from_file(path)
    {
        warn!(path = %path.display(), error = %e, "package catalog not extended");
    }

    let id = settings.id.clone().unwrap_or_default();
    let runtime = Runtime::builder(id).with_catalog(Arc::new(catalog)).build();
    runtime.set_connector(Arc::new(WsConnector::new()));

    println!();
    println!("  Process {}", runtime.fullname().bold().cyan());
    for name in runtime.launch(ld) {
        println!("    {} {}", "✓".green(), name);
    }

    let mut server = tokio::spawn(
        GatewayServer::new(Arc::clone(&runtime))
            .with_port(settings.port)
            .run(),
    );
    println!(
        "  Gateway on port {} (WebSocket peers, HTTP API)",
        settings.port.to_string().bold()
    );
    println!();

    let outcome = tokio::select! {
        _ = stop.notified() => Ok(()),
        joined = &mut server => match joined {
            Ok(result) => result,
            Err(e) => Err(WeaveError::Transport(format!("gateway task failed: {e}"))),
        },
    };

    server.abort();
    runtime.shutdown();
    info!(id = %runtime.id(), "shutdown complete");
    outcome
}

fn fail(msg: &str) -> ! {
    eprintln!("{}: {}", "Error".red().bold(), msg);
    std::process::exit(1);
}

fn print_banner() {
    println!();
    println!("{}", r#" _      __                 "#.bold().cyan());
    println!("{}", r#"| | /| / /__ ___ __  _____ "#.bold().cyan());
    println!("{}", r#"| |/ |/ / -_) _ `/ |/ / -_)"#.bold().cyan());
    println!("{}", r#"|__/|__/\__/\_,_/|___/\__/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Weave".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Distributed service runtime");
    println!();
}
