//! Unix socket IPC for remote control (`wurb-daemon ctl <command>`)

use anyhow::{Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

use wurb_gps::GpsHandle;

use crate::controller::Controller;
use crate::version::BuildInfo;

/// IPC command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcCommand {
    RecOn,
    RecOff,
    AutoOn,
    AutoOff,
    Status,
    Quit,
}

impl IpcCommand {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "rec_on" => Ok(Self::RecOn),
            "rec_off" => Ok(Self::RecOff),
            "auto_on" | "auto" => Ok(Self::AutoOn),
            "auto_off" => Ok(Self::AutoOff),
            "status" => Ok(Self::Status),
            "quit" | "exit" => Ok(Self::Quit),
            _ => anyhow::bail!("Unknown command: {}", s.trim()),
        }
    }
}

/// What the status command reports besides the controller
#[derive(Clone)]
pub struct IpcContext {
    pub controller: Arc<Controller>,
    pub gps: GpsHandle,
}

/// Unix socket IPC server
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
    context: IpcContext,
}

impl IpcServer {
    pub fn new(socket_path: &Path, context: IpcContext) -> Result<Self> {
        // Stale socket from an earlier run
        let _ = std::fs::remove_file(socket_path);

        if let Some(parent) = socket_path.parent() {
            wurb_paths::ensure_dir(parent, true)?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind Unix socket {}", socket_path.display()))?;
        wurb_paths::secure_socket_permissions(socket_path)?;

        info!("IPC server listening on {}", socket_path.display());

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            context,
        })
    }

    /// Serve connections until the task is dropped.
    pub async fn run(&self) -> Result<()> {
        loop {
            let (stream, _) = self
                .listener
                .accept()
                .await
                .context("Failed to accept connection")?;

            let context = self.context.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, context).await {
                    error!("IPC connection error: {}", e);
                }
            });
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Handle a single IPC connection
pub async fn handle_connection(mut stream: UnixStream, context: IpcContext) -> Result<()> {
    let mut buffer = [0u8; 1024];
    let n = stream.read(&mut buffer).await?;

    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..n]);
    debug!("Received IPC command: {}", request.trim());

    let response = match IpcCommand::parse(&request) {
        Ok(command) => execute(command, &context).await,
        Err(e) => format!("Error: {}", e),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;

    Ok(())
}

async fn execute(command: IpcCommand, context: &IpcContext) -> String {
    if command == IpcCommand::Status {
        return status_json(context);
    }
    if command == IpcCommand::Quit {
        info!("Received quit command");
        context.controller.request_quit();
        return "Quitting".to_string();
    }

    let result = context
        .controller
        .run_blocking(move |controller| match command {
            IpcCommand::RecOn => controller.rec_on(),
            IpcCommand::RecOff => controller.rec_off(),
            IpcCommand::AutoOn => controller.auto_on(),
            IpcCommand::AutoOff => controller.auto_off(),
            IpcCommand::Status | IpcCommand::Quit => {}
        })
        .await;

    match result {
        Ok(()) => format!("OK {:?}", command),
        Err(e) => format!("Error: {}", e),
    }
}

fn status_json(context: &IpcContext) -> String {
    let status = context.controller.status();
    let stats = context.controller.recorder_stats();
    let fix = context.gps.fix();

    json!({
        "mode": status.mode,
        "scheduler_active": status.scheduler_active,
        "recording": status.recording,
        "window": status.window.map(|w| w.to_string()),
        "gps": {
            "connected": context.gps.is_connected(),
            "fix": fix,
            "position": fix.latlong_string(),
        },
        "daemon": BuildInfo::current(),
        "recorder": {
            "samples_captured": stats.samples_captured,
            "samples_dropped": stats.samples_dropped,
            "files_written": stats.files_written,
            "last_file": stats.last_file.map(|p| p.display().to_string()),
        },
    })
    .to_string()
}

/// Send one command to a running daemon and return its reply.
pub async fn send_command(socket_path: &Path, command: &str) -> Result<String> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("Failed to connect to {}", socket_path.display()))?;

    stream.write_all(command.as_bytes()).await?;
    stream.shutdown().await?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}
