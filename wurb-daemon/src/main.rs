//! WURB Daemon - unattended bat recorder for the Raspberry Pi
//!
//! Runs as a systemd service. Records ultrasound between sunset and sunrise,
//! or on command from the GPIO switches, a USB mouse or the control socket
//! (`wurb-daemon ctl rec_on`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use wurb_daemon::config::DaemonConfig;
use wurb_daemon::ipc::send_command;
use wurb_daemon::logging::init_logging;
use wurb_daemon::version::BuildInfo;
use wurb_daemon::Appliance;

#[derive(Parser, Debug)]
#[command(name = "wurb-daemon", version, about = "Unattended bat recorder")]
struct Cli {
    /// Configuration file (default: ~/.config/wurb/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List audio input devices and exit
    #[arg(long)]
    list_devices: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a command to the running daemon: rec_on, rec_off, auto_on, auto_off, status, quit
    Ctl { command: String },

    /// Show build information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Version) => {
            print!("{}", BuildInfo::current());
            return Ok(());
        }
        Some(Command::Ctl { command }) => {
            let config = DaemonConfig::load(cli.config.as_deref())
                .context("Failed to load configuration")?;
            let reply = send_command(&config.socket_path()?, &command).await?;
            println!("{}", reply);
            return Ok(());
        }
        None => {}
    }

    if cli.list_devices {
        for device in wurb_audio::list_devices()? {
            println!(
                "{:>3}  {}{}  ({} ch, {} Hz)",
                device.index,
                device.name,
                if device.is_default { " *" } else { "" },
                device.max_input_channels,
                device.default_sample_rate
            );
        }
        return Ok(());
    }

    let config =
        DaemonConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let log_dir = config.log_dir()?;
    let logging = init_logging(&config.logging, Some(&log_dir))?;

    info!("🦇 Starting WURB daemon {}", BuildInfo::current().summary());
    info!("📋 Configuration loaded from {}", config.config_path.display());
    if let Some(dir) = &logging.log_dir {
        info!("📝 Logging to {}", dir.display());
    }

    let mut appliance = match Appliance::start(config).await {
        Ok(appliance) => appliance,
        Err(e) => {
            error!("❌ Failed to start: {:#}", e);
            return Err(e);
        }
    };

    info!("🚀 WURB daemon ready");

    let controller = appliance.controller().clone();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Received shutdown signal");
        }
        _ = controller.quit_requested() => {
            info!("🛑 Quit requested");
        }
    }

    info!("🧹 Shutting down...");
    appliance.shutdown().await;
    info!("👋 WURB daemon stopped");

    Ok(())
}
