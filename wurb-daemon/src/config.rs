//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_appender::rolling::Rotation;

use wurb_audio::{Channels, RecordingFormat, RecordingType, TargetSettings};
use wurb_gps::{format_position, Zone, DEFAULT_GPSD_ADDR};

use crate::controller::ControllerSettings;
use crate::error::{DaemonError, Result as DaemonResult};
use crate::schedule::{ScheduleEvent, SchedulerSettings};

/// Longest hand-off queue, in seconds of capture
pub const MAX_QUEUE_SECONDS: f64 = 60.0;

/// Sound card and wave file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Part of the input device name, empty or "default" for the default input
    pub sound_card: String,

    /// FS192..FS500 full speed, TE192..TE500 time expansion
    pub recording_type: String,

    /// MONO or STEREO
    pub channels: String,

    pub adc_resolution: u16,

    /// Empty = `<data dir>/recordings`
    pub wave_file_dir: String,

    pub wave_file_prefix: String,

    /// Length of each wave file in seconds
    pub record_length_s: u64,

    /// Capture-to-writer buffer, in seconds of audio
    pub queue_seconds: f64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            sound_card: "Pettersson".to_string(),
            recording_type: "FS384".to_string(),
            channels: "MONO".to_string(),
            adc_resolution: 16,
            wave_file_dir: String::new(),
            wave_file_prefix: "WURB".to_string(),
            record_length_s: 300,
            queue_seconds: 5.0,
        }
    }
}

/// Time zone, fallback position and GPS
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// "UTC", "local" or a fixed offset like "+02:00"
    pub timezone: String,

    pub default_latitude: f64,

    pub default_longitude: f64,

    /// Wait for GPS time and position before computing the recording window
    pub only_use_gps_time_and_pos: bool,

    pub use_gps: bool,

    pub gpsd_address: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            default_latitude: 0.0,
            default_longitude: 0.0,
            only_use_gps_time_and_pos: false,
            use_gps: true,
            gpsd_address: DEFAULT_GPSD_ADDR.to_string(),
        }
    }
}

/// Automatic recording between two daily events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub use_scheduler: bool,

    /// sunset, dusk, dawn, sunrise or HH:MM
    pub record_start_event: String,

    /// Minutes, may be negative
    pub record_start_adjust: i32,

    pub record_stop_event: String,

    pub record_stop_adjust: i32,

    pub poll_interval_s: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            use_scheduler: true,
            record_start_event: "sunset".to_string(),
            record_start_adjust: -15,
            record_stop_event: "sunrise".to_string(),
            record_stop_adjust: 15,
            poll_interval_s: 10,
        }
    }
}

/// Physical controls: GPIO switches and a mouse used as a remote
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Three-position record switch (rec on / auto / rec off)
    pub use_gpio_record_switch: bool,
    pub gpio_rec_on: u8,
    pub gpio_rec_off: u8,

    /// Power switch (low power / shutdown)
    pub use_gpio_power_switch: bool,
    pub gpio_low_power: u8,
    pub gpio_shutdown: u8,

    pub use_mouse: bool,
    pub mouse_device: String,
    pub mouse_left_and_right_s: f64,
    pub mouse_button_s: f64,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            use_gpio_record_switch: false,
            gpio_rec_on: 26,
            gpio_rec_off: 20,
            use_gpio_power_switch: false,
            gpio_low_power: 16,
            gpio_shutdown: 21,
            use_mouse: false,
            mouse_device: "/dev/input/mice".to_string(),
            mouse_left_and_right_s: 5.0,
            mouse_button_s: 1.0,
        }
    }
}

/// Power saving, shutdown rules and the shell commands behind them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    pub wifi_off_during_rec: bool,
    pub rpi_shutdown_when_finished: bool,
    pub rpi_shutdown_when_no_space: bool,
    pub min_free_disk_mb: u64,
    pub disk_check_interval_s: u64,

    pub cmd_wifi_off: String,
    pub cmd_wifi_on: String,
    pub cmd_hdmi_off: String,
    pub cmd_hdmi_on: String,
    pub cmd_shutdown: String,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            wifi_off_during_rec: false,
            rpi_shutdown_when_finished: false,
            rpi_shutdown_when_no_space: false,
            min_free_disk_mb: 10,
            disk_check_interval_s: 60,
            cmd_wifi_off: "sudo ifconfig wlan0 down".to_string(),
            cmd_wifi_on: "sudo ifconfig wlan0 up".to_string(),
            cmd_hdmi_off: "/usr/bin/tvservice -o".to_string(),
            cmd_hdmi_on: "/usr/bin/tvservice -p".to_string(),
            cmd_shutdown: "sudo shutdown -h now".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter, overridden by RUST_LOG
    pub level: String,

    pub log_to_file: bool,

    /// Empty = `<data dir>/logs`
    pub log_dir: String,

    /// Start a new file "hourly", "daily" or "never"
    pub rotation: String,

    /// Oldest files beyond this many are deleted, 0 keeps all
    pub max_files: usize,
}

impl LoggingConfig {
    pub fn rotation(&self) -> DaemonResult<Rotation> {
        match self.rotation.to_ascii_lowercase().as_str() {
            "hourly" => Ok(Rotation::HOURLY),
            "daily" => Ok(Rotation::DAILY),
            "never" => Ok(Rotation::NEVER),
            other => Err(DaemonError::config(format!(
                "unknown log rotation '{}', expected hourly, daily or never",
                other
            ))),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: true,
            log_dir: String::new(),
            rotation: "daily".to_string(),
            max_files: 14,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Seconds to wait at start-up for USB sound cards and GPS to settle
    pub startup_delay_s: u64,

    /// Unix socket path for IPC, empty = default location
    pub socket_path: String,

    pub recording: RecordingConfig,
    pub location: LocationConfig,
    pub scheduler: SchedulerConfig,
    pub controls: ControlsConfig,
    pub power: PowerConfig,
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            startup_delay_s: 5,
            socket_path: String::new(),
            recording: RecordingConfig::default(),
            location: LocationConfig::default(),
            scheduler: SchedulerConfig::default(),
            controls: ControlsConfig::default(),
            power: PowerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing file is created with default values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => wurb_paths::get_config_path().context("Failed to locate config directory")?,
        };

        let config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;

            let mut config: DaemonConfig = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?;

            config.config_path = config_path;
            config
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save().context("Failed to save default config")?;
            config
        };

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Check every field that is parsed later, so bad values fail at start-up.
    pub fn validate(&self) -> DaemonResult<()> {
        self.recording_format()?;
        self.zone()?;
        self.start_event()?;
        self.stop_event()?;
        self.logging.rotation()?;

        if self.recording.record_length_s == 0 {
            return Err(DaemonError::config("record_length_s must be at least 1"));
        }
        let queue = self.recording.queue_seconds;
        if queue.is_nan() || queue <= 0.0 || queue > MAX_QUEUE_SECONDS {
            return Err(DaemonError::config(format!(
                "queue_seconds must be in (0, {}]",
                MAX_QUEUE_SECONDS
            )));
        }
        if self.scheduler.poll_interval_s == 0 || self.power.disk_check_interval_s == 0 {
            return Err(DaemonError::config("poll intervals must be at least 1 second"));
        }
        Ok(())
    }

    pub fn recording_type(&self) -> DaemonResult<RecordingType> {
        Ok(self.recording.recording_type.parse()?)
    }

    pub fn recording_format(&self) -> DaemonResult<RecordingFormat> {
        let channels: Channels = self.recording.channels.parse()?;
        Ok(RecordingFormat::new(
            &self.recording_type()?,
            channels,
            self.recording.adc_resolution,
        )?)
    }

    pub fn zone(&self) -> DaemonResult<Zone> {
        Ok(self.location.timezone.parse()?)
    }

    pub fn start_event(&self) -> DaemonResult<ScheduleEvent> {
        self.scheduler.record_start_event.parse()
    }

    pub fn stop_event(&self) -> DaemonResult<ScheduleEvent> {
        self.scheduler.record_stop_event.parse()
    }

    pub fn file_length(&self) -> Duration {
        Duration::from_secs(self.recording.record_length_s)
    }

    /// Position text for file names when GPS has none
    pub fn default_position(&self) -> String {
        format_position(
            self.location.default_latitude,
            self.location.default_longitude,
        )
    }

    /// Where and how the recorder writes its wave files
    pub fn target_settings(&self) -> Result<TargetSettings> {
        Ok(TargetSettings {
            dir_path: self.wave_file_dir()?,
            filename_prefix: self.recording.wave_file_prefix.clone(),
            default_position: self.default_position(),
            rec_type: self.recording.recording_type.clone(),
            file_length: self.file_length(),
            format: self.recording_format()?,
        })
    }

    pub fn scheduler_settings(&self) -> DaemonResult<SchedulerSettings> {
        Ok(SchedulerSettings {
            start_event: self.start_event()?,
            start_adjust_min: self.scheduler.record_start_adjust,
            stop_event: self.stop_event()?,
            stop_adjust_min: self.scheduler.record_stop_adjust,
            default_latitude: self.location.default_latitude,
            default_longitude: self.location.default_longitude,
            only_use_gps_time_and_pos: self.location.only_use_gps_time_and_pos,
            poll_interval: Duration::from_secs(self.scheduler.poll_interval_s),
            zone: self.zone()?,
        })
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            wifi_off_during_rec: self.power.wifi_off_during_rec,
            rpi_shutdown_when_finished: self.power.rpi_shutdown_when_finished,
            rpi_shutdown_when_no_space: self.power.rpi_shutdown_when_no_space,
            ..ControllerSettings::default()
        }
    }

    pub fn wave_file_dir(&self) -> Result<PathBuf> {
        if self.recording.wave_file_dir.is_empty() {
            wurb_paths::get_recordings_dir()
        } else {
            Ok(PathBuf::from(&self.recording.wave_file_dir))
        }
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        if self.logging.log_dir.is_empty() {
            wurb_paths::get_logs_dir()
        } else {
            Ok(PathBuf::from(&self.logging.log_dir))
        }
    }

    pub fn socket_path(&self) -> Result<PathBuf> {
        if self.socket_path.is_empty() {
            wurb_paths::get_ipc_socket_path()
        } else {
            Ok(PathBuf::from(&self.socket_path))
        }
    }
}
