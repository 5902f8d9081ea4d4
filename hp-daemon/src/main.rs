//! Hotplugger Daemon (hotpluggerd)
//!
//! Owns the process-wide arbiter, registers the sysfs-backed drivers named
//! in the settings file and serves the control surface over a Unix socket.
//!
//! # Lifecycle
//! 1. Restrictive umask, logging to the journal (stdout fallback)
//! 2. Settings load and validation
//! 3. Arbiter creation and driver registration
//! 4. Socket server until SIGINT/SIGTERM
//! 5. Every registered driver is unregistered, which switches it off

mod server;

use std::path::PathBuf;
use tracing::{error, info, warn};

use hp_core::{constants, init_global, load_settings_from, ArbiterSettings, DescriptorRef, Hotplugger};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log filter environment variable
const LOG_ENV: &str = "HOTPLUGGER_LOG";

struct Options {
    socket_path: String,
    settings_path: PathBuf,
}

fn print_help() {
    eprintln!("hotpluggerd {} - hotplug driver arbitration daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    hotpluggerd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -s, --socket PATH   Socket path (default {})", constants::paths::SOCKET_PATH);
    eprintln!("    -c, --config PATH   Settings file");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {}      Log filter (trace, debug, info, warn, error)", LOG_ENV);
    eprintln!("    {}   Settings file", constants::paths::CONFIG_ENV);
    eprintln!("    {}   Socket path", constants::paths::SOCKET_ENV);
}

/// `None` means the process should exit successfully without serving
fn parse_args() -> Option<Options> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        socket_path: constants::paths::socket_path(),
        settings_path: hp_core::get_settings_path(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return None;
            }
            "-v" | "--version" => {
                println!("hotpluggerd {}", VERSION);
                return None;
            }
            flag @ ("-s" | "--socket" | "-c" | "--config") => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("Error: {} requires a path argument", flag);
                    std::process::exit(1);
                };
                if flag == "-s" || flag == "--socket" {
                    options.socket_path = value.clone();
                } else {
                    options.settings_path = PathBuf::from(value);
                }
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }
    Some(options)
}

/// Journald when available, stdout otherwise. Returns whether journald is used.
fn init_logging(log_level: &str) -> bool {
    use tracing_subscriber::prelude::*;

    if std::path::Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(log_level))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level)
        .init();
    false
}

fn set_secure_umask() {
    // SAFETY: umask only replaces the process file creation mask.
    unsafe { libc::umask(0o007) };
}

fn warn_if_unprivileged() {
    // SAFETY: geteuid has no preconditions.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        warn!("Running as euid={}, sysfs writes will likely fail", euid);
    }
}

/// Register every configured driver. Failures are logged and skipped.
fn register_configured(hp: &Hotplugger, settings: &ArbiterSettings) -> Vec<DescriptorRef> {
    let mut registered = Vec::new();
    for c in &settings.controllers {
        let descriptor = c.build();
        match hp.register(&descriptor) {
            Ok(()) => {
                info!(
                    "Registered \"{}\" ({}, {})",
                    descriptor.name(),
                    c.path.display(),
                    if descriptor.is_enabled() { "on" } else { "off" }
                );
                registered.push(descriptor);
            }
            Err(e) => warn!("Could not register \"{}\": {}", c.name, e),
        }
    }
    registered
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    set_secure_umask();

    let Some(options) = parse_args() else {
        return Ok(());
    };

    let log_level = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());
    let use_journald = init_logging(&log_level);

    info!("STARTUP: hotpluggerd {} starting", VERSION);
    info!("STARTUP: Logging to {}", if use_journald { "systemd journal" } else { "stdout" });
    warn_if_unprivileged();

    let settings = match load_settings_from(&options.settings_path) {
        Ok(s) => s,
        Err(e) => {
            error!("Invalid settings {}: {}", options.settings_path.display(), e);
            std::process::exit(1);
        }
    };

    let hp = init_global(&settings);
    let registered = register_configured(hp, &settings);
    info!(
        "STARTUP: {} driver(s) registered, arbitration {}",
        hp.count_registered(),
        if hp.is_open() { "enabled" } else { "disabled" }
    );

    let ctx = server::ServerContext {
        hotplugger: hp,
        show_buffer_len: settings.show_buffer_len,
    };
    let result = server::run_server(&options.socket_path, ctx).await;

    for d in &registered {
        hp.unregister(d);
    }
    info!("SHUTDOWN: {} driver(s) released", registered.len());

    if let Err(e) = result {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
