//! Filesystem locations for the WURB recorder.
//!
//! Every directory the appliance touches is resolved here so that the daemon,
//! the control client and the tests agree on one layout.
//!
//! | Purpose     | Location |
//! |-------------|----------|
//! | Config      | `~/.config/wurb/config.toml` |
//! | Data        | `~/.local/share/wurb` |
//! | Recordings  | `<data>/recordings` |
//! | Logs        | `<data>/logs` |
//! | Socket      | `$XDG_RUNTIME_DIR/wurb.sock` or `<data>/wurb.sock` |

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine data directory")]
    NoDataDirectory,

    #[error("Could not determine config directory")]
    NoConfigDirectory,
}

const APP_NAME: &str = "wurb";

const IPC_SOCKET_NAME: &str = "wurb.sock";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Create `dir` (and parents) if it does not exist yet.
///
/// With `private` set the directory is restricted to its owner (0o700) on Unix.
pub fn ensure_dir(dir: &Path, private: bool) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if private {
                fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).with_context(
                    || format!("Failed to set permissions on {}", dir.display()),
                )?;
            }
        }
        #[cfg(not(unix))]
        let _ = private;
    }
    Ok(())
}

/// Application data directory, created on first use.
pub fn get_data_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().ok_or(PathError::NoDataDirectory)?;
    let data_dir = base_dir.join(APP_NAME);
    ensure_dir(&data_dir, true)?;
    Ok(data_dir)
}

/// Directory holding `config.toml`, created on first use.
pub fn get_config_dir() -> Result<PathBuf> {
    let base_dir = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
    let config_dir = base_dir.join(APP_NAME);
    ensure_dir(&config_dir, true)?;
    Ok(config_dir)
}

/// Default path of the TOML configuration file.
///
/// The file itself is not created here.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Directory for the rotating daemon log.
pub fn get_logs_dir() -> Result<PathBuf> {
    let logs_dir = get_data_dir()?.join("logs");
    ensure_dir(&logs_dir, false)?;
    Ok(logs_dir)
}

/// Default directory for wave files when the config leaves it empty.
///
/// Not created here: the recorder creates it when the first file is opened,
/// and the disk monitor treats a missing directory as "nothing recorded yet".
pub fn get_recordings_dir() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("recordings"))
}

/// Directory for the control socket.
///
/// Prefers `$XDG_RUNTIME_DIR` on Linux and falls back to the data directory.
pub fn get_socket_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        if let Some(runtime_dir) = dirs::runtime_dir() {
            if runtime_dir.exists() {
                return Ok(runtime_dir);
            }
        }
    }

    get_data_dir()
}

/// Path of the control socket used by `wurb-daemon ctl`.
pub fn get_ipc_socket_path() -> Result<PathBuf> {
    Ok(get_socket_dir()?.join(IPC_SOCKET_NAME))
}

/// Restrict a socket file to its owner (0o600).
#[cfg(unix)]
pub fn secure_socket_permissions(socket_path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if socket_path.exists() {
        fs::set_permissions(socket_path, fs::Permissions::from_mode(0o600)).with_context(
            || format!("Failed to set socket permissions: {}", socket_path.display()),
        )?;
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn secure_socket_permissions(_socket_path: &Path) -> Result<()> {
    Ok(())
}
