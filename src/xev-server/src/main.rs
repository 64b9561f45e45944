// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! xev-server: xPL event automation daemon.

mod admin;
mod client;
mod daemon;
mod error;
mod scripts;
mod transfer;
mod triggers;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_mio::v1_0::Signals;
use tracing::info;

use xev_app::{init_logging, Config};
use xev_core::{Engine, EngineConfig, Poller, Receiver, ReportMode, Watch};
use xev_sched::Scheduler;
use xev_store::{FileStore, RetryPolicy, Store};

use admin::AdminServer;
use daemon::World;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - xPL event automation daemon");

#[derive(Debug, Parser)]
#[command(version = env!("CARGO_PKG_VERSION"), about = PKG_DESCRIPTION)]
struct Cli {
    /// Path to configuration file
    #[arg(short = 'C', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Local interface IP address to bind and advertise
    #[arg(short = 'i', long = "ipaddr")]
    ipaddr: Option<IpAddr>,
    /// Instance id of the hosted service; "auto" generates one
    #[arg(short = 's', long = "instance")]
    instance: Option<String>,
    /// State file path
    #[arg(short = 'o', long = "store", value_name = "FILE")]
    store: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'd', long = "log-level")]
    log_level: Option<String>,
    /// Exit on script parse or run errors
    #[arg(short = 'e', long = "exitonerr")]
    exit_on_error: bool,
    /// Admin listener port
    #[arg(short = 'S', long = "lstport")]
    admin_port: Option<u16>,
    /// Daemon host for the client utility functions
    #[arg(short = 'h', long = "host", default_value = "127.0.0.1")]
    host: String,
    /// Utility: send a command line to a running daemon
    #[arg(short = 'x', long = "command", value_name = "CMD")]
    command: Option<String>,
    /// Utility: download the named script into --file
    #[arg(short = 'g', long = "get", value_name = "NAME")]
    get: Option<String>,
    /// Utility: upload --file as the named script
    #[arg(short = 'p', long = "put", value_name = "NAME")]
    put: Option<String>,
    /// Utility: check script file syntax and exit
    #[arg(short = 'c', long = "check")]
    check: bool,
    /// File path used by the utility functions
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", Config::example_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = match &cli.config {
        Some(path) => (Config::load_from_file(path)?, Some(path.clone())),
        None => Config::load_from_default_paths()?,
    };
    apply_overrides(&mut cfg, &cli);

    if let Some(result) = utility_mode(&cli, &cfg) {
        return result;
    }

    cfg.validate()?;
    init_logging(cfg.general.log_level.as_deref());
    if let Some(path) = config_path {
        info!("loaded configuration from {}", path.display());
    }

    let poller = Poller::new(64)?;

    let engine_cfg = EngineConfig {
        ip: cfg.xpl.ip,
        broadcast: cfg.xpl.broadcast,
        port: cfg.xpl.port,
    };
    let (mut engine, rx_socket) = Engine::new(&engine_cfg)?;

    let version = cfg
        .xpl
        .advertise_version
        .then(|| env!("CARGO_PKG_VERSION").to_string());
    let instance = (cfg.general.instance != "auto").then_some(cfg.general.instance.as_str());
    let service = engine.new_service(
        &cfg.general.vendor,
        &cfg.general.device,
        instance,
        version.as_deref(),
    )?;
    engine.set_heartbeat_interval(service, cfg.xpl.heartbeat_interval)?;
    engine.set_report_mode(service, ReportMode::Normal, false)?;

    let ready = poller.registrar().waker(daemon::RX_READY)?;
    let receiver = Receiver::spawn(rx_socket, ready)?;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    poller
        .registrar()
        .register_source(&mut signals, Watch::IN, daemon::SIGNALS_TOKEN)?;

    let store: Box<dyn Store> = Box::new(FileStore::open_with(
        &cfg.store.path,
        RetryPolicy {
            backoff: Duration::from_millis(cfg.store.backoff_ms),
            attempts: cfg.store.max_retries,
        },
    )?);
    info!("state file: {}", cfg.store.path.display());

    let scheduler = Scheduler::new(
        cfg.general.latitude.unwrap_or(0.0),
        cfg.general.longitude.unwrap_or(0.0),
    );

    let admin = if cfg.admin.enabled {
        let server = AdminServer::bind(SocketAddr::new(cfg.admin.listen, cfg.admin.port))?;
        poller.register(server.listener_fd(), Watch::IN, daemon::ADMIN_LISTENER)?;
        Some(server)
    } else {
        None
    };

    engine.enable_service(service)?;
    info!(tag = %engine.service_tag(service)?, "service enabled");

    let world = World::new(
        cfg, engine, service, receiver, store, scheduler, admin, signals,
    )?;
    daemon::run(poller, world)?;
    Ok(())
}

fn apply_overrides(cfg: &mut Config, cli: &Cli) {
    if let Some(ip) = cli.ipaddr {
        cfg.xpl.ip = ip;
    }
    if let Some(instance) = &cli.instance {
        cfg.general.instance = instance.clone();
    }
    if let Some(path) = &cli.store {
        cfg.store.path = path.clone();
    }
    if let Some(level) = &cli.log_level {
        cfg.general.log_level = Some(level.clone());
    }
    if cli.exit_on_error {
        cfg.general.exit_on_error = true;
    }
    if let Some(port) = cli.admin_port {
        cfg.admin.port = port;
    }
}

/// Handle the client utility flags; `None` means run as a daemon.
fn utility_mode(cli: &Cli, cfg: &Config) -> Option<Result<(), Box<dyn std::error::Error>>> {
    if cli.check {
        return Some(match &cli.file {
            Some(file) => client::check_file(file)
                .map(|()| println!("syntax ok"))
                .map_err(Into::into),
            None => Err("--check requires --file".into()),
        });
    }
    if let Some(cmdline) = &cli.command {
        return Some(
            client::send_command(&cli.host, cfg.admin.port, cmdline)
                .map(|reply| println!("{reply}"))
                .map_err(Into::into),
        );
    }
    if let Some(name) = &cli.get {
        return Some(match &cli.file {
            Some(file) => client::get_script(&cli.host, cfg.admin.port, name, file)
                .map(|()| println!("script received"))
                .map_err(Into::into),
            None => Err("--get requires --file".into()),
        });
    }
    if let Some(name) = &cli.put {
        return Some(match &cli.file {
            Some(file) => client::put_script(&cli.host, cfg.admin.port, name, file)
                .map(|()| println!("script uploaded"))
                .map_err(Into::into),
            None => Err("--put requires --file".into()),
        });
    }
    None
}
