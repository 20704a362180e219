//! Recording mode state machine shared by every control surface
//!
//! GPIO switches, the mouse, the scheduler, disk housekeeping and the IPC
//! socket all funnel into one [`Controller`]. Commands are serialised, so a
//! `rec_on` from the mouse never interleaves with an `auto_on` from GPIO.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinError;
use tracing::{error, info};

use wurb_audio::{RecorderStats, SoundRecorder};

use crate::error::Result;
use crate::schedule::RecordingWindow;

/// Manual and automatic recording modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    RecOn,
    RecOff,
    AutoOn,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::RecOn => "rec_on",
            Mode::RecOff => "rec_off",
            Mode::AutoOn => "auto_on",
        })
    }
}

/// What the controller needs from the sound recorder
pub trait RecordingControl: Send + Sync {
    fn start(&self) -> Result<()>;
    fn stop(&self);
    fn is_running(&self) -> bool;

    fn stats(&self) -> RecorderStats {
        RecorderStats::default()
    }
}

impl RecordingControl for SoundRecorder {
    fn start(&self) -> Result<()> {
        Ok(SoundRecorder::start(self)?)
    }

    fn stop(&self) {
        SoundRecorder::stop(self);
    }

    fn is_running(&self) -> bool {
        SoundRecorder::is_running(self)
    }

    fn stats(&self) -> RecorderStats {
        SoundRecorder::stats(self)
    }
}

/// Power and network actions on the host. Implementations log their own failures.
pub trait SystemActions: Send + Sync {
    fn wifi_off(&self);
    fn wifi_on(&self);
    fn hdmi_off(&self);
    fn hdmi_on(&self);
    fn shutdown(&self);
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub wifi_off_during_rec: bool,
    pub rpi_shutdown_when_finished: bool,
    pub rpi_shutdown_when_no_space: bool,
    /// Pause between stopping and restarting a running recorder
    pub restart_pause: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            wifi_off_during_rec: false,
            rpi_shutdown_when_finished: false,
            rpi_shutdown_when_no_space: false,
            restart_pause: Duration::from_secs(1),
        }
    }
}

/// Snapshot for the status command
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub mode: Option<Mode>,
    pub scheduler_active: bool,
    pub recording: bool,
    pub window: Option<RecordingWindow>,
}

pub struct Controller {
    recorder: Arc<dyn RecordingControl>,
    system: Arc<dyn SystemActions>,
    settings: ControllerSettings,
    mode: Mutex<Option<Mode>>,
    scheduler_active: AtomicBool,
    window: Mutex<Option<RecordingWindow>>,
    commands: Mutex<()>,
    quit: Arc<Notify>,
    quitting: AtomicBool,
}

impl Controller {
    pub fn new(
        recorder: Arc<dyn RecordingControl>,
        system: Arc<dyn SystemActions>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            recorder,
            system,
            settings,
            mode: Mutex::new(None),
            scheduler_active: AtomicBool::new(false),
            window: Mutex::new(None),
            commands: Mutex::new(()),
            quit: Arc::new(Notify::new()),
            quitting: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        *self.mode.lock()
    }

    pub fn is_scheduler_active(&self) -> bool {
        self.scheduler_active.load(Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_running()
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            mode: self.mode(),
            scheduler_active: self.is_scheduler_active(),
            recording: self.is_recording(),
            window: *self.window.lock(),
        }
    }

    pub fn recorder_stats(&self) -> RecorderStats {
        self.recorder.stats()
    }

    pub fn set_window(&self, window: Option<RecordingWindow>) {
        *self.window.lock() = window;
    }

    /// Run a command on the blocking pool. Stopping the recorder joins its
    /// threads, so async callers go through here.
    pub async fn run_blocking<F>(
        self: &Arc<Self>,
        command: F,
    ) -> std::result::Result<(), JoinError>
    where
        F: FnOnce(&Controller) + Send + 'static,
    {
        let controller = Arc::clone(self);
        tokio::task::spawn_blocking(move || command(&controller)).await
    }

    /// Record now, whatever the time.
    pub fn rec_on(&self) {
        let _guard = self.commands.lock();
        info!("Controller: start recording");
        self.set_mode(Mode::RecOn);
        self.deactivate_scheduler();
        self.restart_recording();
    }

    /// Stop recording and stay stopped.
    pub fn rec_off(&self) {
        let _guard = self.commands.lock();
        info!("Controller: stop recording");
        self.set_mode(Mode::RecOff);
        self.deactivate_scheduler();
        self.stop_recording_locked();
    }

    /// Hand control to the scheduler.
    pub fn auto_on(&self) {
        let _guard = self.commands.lock();
        info!("Controller: activate auto");
        self.set_mode(Mode::AutoOn);
        self.stop_recording_locked();
        self.scheduler_active.store(true, Ordering::SeqCst);
    }

    /// Take control from the scheduler; the mode is left as it is.
    pub fn auto_off(&self) {
        let _guard = self.commands.lock();
        self.deactivate_scheduler();
    }

    /// Start the recorder, restarting it if it is already running.
    pub fn start_recording(&self) {
        let _guard = self.commands.lock();
        self.restart_recording();
    }

    pub fn stop_recording(&self) {
        let _guard = self.commands.lock();
        self.stop_recording_locked();
    }

    /// The scheduler says it is time to record.
    pub fn scheduler_rec_active(&self) {
        let _guard = self.commands.lock();
        if !self.is_scheduler_active() || self.recorder.is_running() {
            return;
        }

        info!("Scheduler: start recording");
        self.start_once();
        if self.settings.wifi_off_during_rec {
            self.system.wifi_off();
        }
    }

    /// The scheduler says the window is over.
    pub fn scheduler_rec_inactive(&self) {
        let _guard = self.commands.lock();
        if !self.is_scheduler_active() || !self.recorder.is_running() {
            return;
        }

        info!("Scheduler: stop recording");
        self.recorder.stop();
        if self.settings.wifi_off_during_rec {
            self.system.wifi_on();
        }
        self.rec_finished();
    }

    /// Disk is (nearly) full: stop, and power off if we were meant to be recording.
    pub fn out_of_disk_space(&self) {
        let previous = self.mode();
        self.rec_off();

        if matches!(previous, Some(Mode::RecOn | Mode::AutoOn))
            && self.settings.rpi_shutdown_when_no_space
        {
            info!("Controller: no disk space left, shutting down");
            self.power_off();
        }
    }

    /// Stop the appliance and halt the host.
    pub fn power_off(&self) {
        self.request_quit();
        self.system.shutdown();
    }

    /// Low-power switch: WiFi and HDMI off
    pub fn low_power_on(&self) {
        info!("Controller: low power on");
        self.system.wifi_off();
        self.system.hdmi_off();
    }

    pub fn low_power_off(&self) {
        info!("Controller: low power off");
        self.system.wifi_on();
        self.system.hdmi_on();
    }

    /// Ask the main loop to stop the appliance.
    pub fn request_quit(&self) {
        self.quitting.store(true, Ordering::SeqCst);
        self.quit.notify_one();
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting.load(Ordering::SeqCst)
    }

    /// Resolves once [`request_quit`](Self::request_quit) has been called.
    pub async fn quit_requested(&self) {
        if self.is_quitting() {
            return;
        }
        self.quit.notified().await;
    }

    /// Final stop on shutdown
    pub fn shutdown(&self) {
        let _guard = self.commands.lock();
        self.deactivate_scheduler();
        self.stop_recording_locked();
    }

    fn rec_finished(&self) {
        if self.settings.rpi_shutdown_when_finished {
            info!("Scheduler: recording finished, shutting down");
            self.power_off();
        }
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock() = Some(mode);
    }

    fn deactivate_scheduler(&self) {
        if self.scheduler_active.swap(false, Ordering::SeqCst) {
            info!("Controller: deactivate auto");
        }
    }

    fn restart_recording(&self) {
        if self.recorder.is_running() {
            self.recorder.stop();
            std::thread::sleep(self.settings.restart_pause);
        }
        self.start_once();
    }

    fn start_once(&self) {
        if let Err(e) = self.recorder.start() {
            error!("Failed to start sound recorder: {}", e);
        }
    }

    fn stop_recording_locked(&self) {
        if self.recorder.is_running() {
            self.recorder.stop();
        }
    }
}
