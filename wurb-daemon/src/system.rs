//! Host actions through configurable shell commands

use std::process::Command;
use tracing::{debug, error, info};

use crate::config::PowerConfig;
use crate::controller::SystemActions;

/// Runs each action as `sh -c <command>`. An empty command disables the action.
#[derive(Debug, Clone)]
pub struct ShellActions {
    wifi_off: String,
    wifi_on: String,
    hdmi_off: String,
    hdmi_on: String,
    shutdown: String,
}

impl ShellActions {
    pub fn from_config(power: &PowerConfig) -> Self {
        Self {
            wifi_off: power.cmd_wifi_off.clone(),
            wifi_on: power.cmd_wifi_on.clone(),
            hdmi_off: power.cmd_hdmi_off.clone(),
            hdmi_on: power.cmd_hdmi_on.clone(),
            shutdown: power.cmd_shutdown.clone(),
        }
    }

    /// Returns whether the command ran and exited successfully.
    fn run(&self, label: &str, command: &str) -> bool {
        if command.trim().is_empty() {
            debug!("{}: no command configured", label);
            return false;
        }

        info!("{}: {}", label, command);
        match Command::new("sh").arg("-c").arg(command).status() {
            Ok(status) if status.success() => true,
            Ok(status) => {
                error!("{} failed: '{}' exited with {}", label, command, status);
                false
            }
            Err(e) => {
                error!("{} failed: could not run '{}': {}", label, command, e);
                false
            }
        }
    }
}

impl SystemActions for ShellActions {
    fn wifi_off(&self) {
        self.run("WiFi off", &self.wifi_off);
    }

    fn wifi_on(&self) {
        self.run("WiFi on", &self.wifi_on);
    }

    fn hdmi_off(&self) {
        self.run("HDMI off", &self.hdmi_off);
    }

    fn hdmi_on(&self) {
        self.run("HDMI on", &self.hdmi_on);
    }

    fn shutdown(&self) {
        self.run("Shutdown", &self.shutdown);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn actions(cmd: &str) -> ShellActions {
        ShellActions {
            wifi_off: cmd.to_string(),
            wifi_on: String::new(),
            hdmi_off: "false".to_string(),
            hdmi_on: "/nonexistent/tvservice -p".to_string(),
            shutdown: "true".to_string(),
        }
    }

    #[test]
    fn test_runs_configured_command() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("wifi_off");
        let shell = actions(&format!("touch {}", marker.display()));

        assert!(shell.run("WiFi off", &shell.wifi_off));
        assert!(marker.exists());
    }

    #[test]
    fn test_failures_are_reported_not_raised() {
        let shell = actions("true");
        assert!(!shell.run("WiFi on", &shell.wifi_on));
        assert!(!shell.run("HDMI off", &shell.hdmi_off));
        assert!(!shell.run("HDMI on", &shell.hdmi_on));

        // Trait methods swallow every failure
        shell.wifi_on();
        shell.hdmi_off();
        shell.hdmi_on();
        shell.shutdown();
    }

    #[test]
    fn test_defaults_from_config() {
        let shell = ShellActions::from_config(&PowerConfig::default());
        assert_eq!(shell.wifi_off, "sudo ifconfig wlan0 down");
        assert_eq!(shell.hdmi_on, "/usr/bin/tvservice -p");
    }
}
