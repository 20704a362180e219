//! Fakes for driving the controller without sound cards or a shell

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use wurb_daemon::controller::{
    Controller, ControllerSettings, RecordingControl, SystemActions,
};
use wurb_daemon::{DaemonError, Result};

#[derive(Default)]
pub struct FakeRecorder {
    pub running: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub fail_start: AtomicBool,
    /// Milliseconds `stop` blocks for, like joining the capture threads
    pub stop_delay_ms: AtomicU64,
}

impl RecordingControl for FakeRecorder {
    fn start(&self) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(DaemonError::config("no sound card"));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        let delay = self.stop_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl FakeRecorder {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeSystem {
    calls: Mutex<Vec<&'static str>>,
}

impl FakeSystem {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SystemActions for FakeSystem {
    fn wifi_off(&self) {
        self.push("wifi_off");
    }

    fn wifi_on(&self) {
        self.push("wifi_on");
    }

    fn hdmi_off(&self) {
        self.push("hdmi_off");
    }

    fn hdmi_on(&self) {
        self.push("hdmi_on");
    }

    fn shutdown(&self) {
        self.push("shutdown");
    }
}

pub struct Rig {
    pub recorder: Arc<FakeRecorder>,
    pub system: Arc<FakeSystem>,
    pub controller: Arc<Controller>,
}

pub fn rig(settings: ControllerSettings) -> Rig {
    let recorder = Arc::new(FakeRecorder::default());
    let system = Arc::new(FakeSystem::default());
    let controller = Arc::new(Controller::new(
        recorder.clone(),
        system.clone(),
        ControllerSettings {
            restart_pause: Duration::ZERO,
            ..settings
        },
    ));
    Rig {
        recorder,
        system,
        controller,
    }
}

pub fn default_rig() -> Rig {
    rig(ControllerSettings::default())
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Async variant of [`wait_for`] that yields to the runtime between polls.
pub async fn wait_for_async(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
