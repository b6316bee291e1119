//! devdroid - supervised Tauri Android dev sessions
//!
//! This is the binary entry point. All logic lives in the workspace crates.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use devdroid_adb::{locate_adb, AdbBridge, SystemRunner};
use devdroid_app::config::Config;
use devdroid_app::netaddr::{self, AddressSource, NetworkAddress};
use devdroid_app::session::DevSession;
use devdroid_app::signals;
use devdroid_app::supervisor::ProcessSupervisor;
use devdroid_core::prelude::*;

/// devdroid - supervised Tauri Android dev sessions
#[derive(Parser, Debug)]
#[command(name = "devdroid")]
#[command(about = "Supervised Tauri Android dev sessions over adb", long_about = None)]
struct Args {
    /// Path to the Tauri project
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Application package id (overrides devdroid.toml and tauri.conf.json)
    #[arg(long)]
    package: Option<String>,

    /// Activity started on the device
    #[arg(long)]
    activity: Option<String>,

    /// Host port the dev server listens on
    #[arg(long)]
    port: Option<u16>,

    /// Device port reversed back to the host
    #[arg(long)]
    remote_port: Option<u16>,

    /// Bind address (skips LAN discovery)
    #[arg(long)]
    host: Option<std::net::Ipv4Addr>,
}

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let args = Args::parse();

    if let Err(e) = color_eyre::install() {
        eprintln!("Failed to initialize error reporting: {e}");
        return 1;
    }
    if let Err(e) = devdroid_core::logging::init() {
        eprintln!("Failed to initialize logging: {e}");
        return 1;
    }

    let project_root = args
        .path
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    info!("Project: {}", project_root.display());

    let supervisor = Arc::new(ProcessSupervisor::new());

    // Race the pipeline against a termination signal; either way, supervised
    // cleanup below is the single exit point for every background process.
    let outcome = tokio::select! {
        result = start_session(&args, &project_root, Arc::clone(&supervisor)) => result,
        _ = signals::wait_for_signal() => Err(Error::Interrupted),
    };

    let stopped = supervisor.cleanup().await;
    if !stopped.is_empty() {
        info!("Stopped: {}", stopped.join(", "));
    }

    match outcome {
        Ok(()) => {
            info!("Session finished");
            0
        }
        Err(Error::Interrupted) => {
            info!("Session stopped by user");
            0
        }
        Err(e) => {
            error!("{}", e);
            if let Some(hint) = e.remediation() {
                error!("{}", hint);
            }
            e.exit_code()
        }
    }
}

/// Resolve configuration, the bridge executable, and the LAN address, then
/// hand over to the pipeline. Everything here must fail before any process
/// has been spawned.
async fn start_session(
    args: &Args,
    project_root: &Path,
    supervisor: Arc<ProcessSupervisor>,
) -> Result<()> {
    let mut config = Config::load(project_root)?;
    if let Some(package) = &args.package {
        config.package = Some(package.clone());
    }
    if let Some(activity) = &args.activity {
        config.activity = activity.clone();
    }
    if let Some(port) = args.port {
        config.local_port = port;
    }
    if let Some(port) = args.remote_port {
        config.remote_port = port;
    }
    config.require_package()?;

    let adb = locate_adb()?;
    info!("Using adb at {}", adb.display());

    let host = match args.host {
        Some(addr) => NetworkAddress::new(addr, AddressSource::Manual),
        None => netaddr::resolve(&config.excluded_prefixes).await,
    };
    if host.is_unspecified() {
        return Err(Error::NoLanAddress);
    }
    info!("Using LAN address {}", host);

    let bridge = AdbBridge::new(adb, SystemRunner);
    let session = DevSession::new(
        project_root.to_path_buf(),
        config,
        host,
        bridge,
        SystemRunner,
        supervisor,
    );
    session.run().await
}
