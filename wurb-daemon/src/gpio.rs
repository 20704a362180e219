//! Raspberry Pi GPIO switches
//!
//! Two switches, both wired to ground with the internal pull-ups enabled, so
//! a pin that reads low is a closed switch.
//!
//! * Record switch (BCM 26 / 20): rec on, auto, rec off.
//! * Power switch (BCM 16 / 21): low power (WiFi and HDMI off), shutdown.
//!
//! The debounce logic lives in [`RecordSwitch`] and [`PowerSwitch`] and is
//! independent of the hardware behind [`PinInput`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::controller::Controller;
#[cfg(not(target_os = "linux"))]
use crate::error::DaemonError;
use crate::error::Result;

/// Record switch poll period
pub const RECORD_POLL: Duration = Duration::from_millis(100);

/// Consecutive low polls before the record switch counts as engaged
pub const HOLD_POLLS: u32 = 5;

/// Power switch poll period
pub const POWER_POLL: Duration = Duration::from_secs(1);

/// Delay before the confirming second read of the power switch
pub const CONFIRM_DELAY: Duration = Duration::from_millis(100);

/// One input pin
pub trait PinInput: Send {
    fn is_low(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchCommand {
    RecOn,
    RecOff,
    AutoOn,
    LowPowerOn,
    LowPowerOff,
    Shutdown,
}

/// Three-position record switch: rec on / auto (both pins high) / rec off
#[derive(Debug, Default)]
pub struct RecordSwitch {
    rec_on_count: u32,
    rec_off_count: u32,
    rec_on_engaged: bool,
    rec_off_engaged: bool,
}

impl RecordSwitch {
    /// Feed one poll of both pins and get the commands it triggers.
    pub fn poll(&mut self, rec_on_low: bool, rec_off_low: bool) -> Vec<SwitchCommand> {
        let mut commands = Vec::new();

        if rec_on_low {
            self.rec_on_count = self.rec_on_count.saturating_add(1);
            if self.rec_on_count >= HOLD_POLLS && !self.rec_on_engaged {
                self.rec_on_engaged = true;
                commands.push(SwitchCommand::RecOn);
            }
        } else {
            self.rec_on_count = 0;
            if self.rec_on_engaged {
                self.rec_on_engaged = false;
                commands.push(SwitchCommand::AutoOn);
            }
        }

        if rec_off_low {
            self.rec_off_count = self.rec_off_count.saturating_add(1);
            if self.rec_off_count >= HOLD_POLLS && !self.rec_off_engaged {
                self.rec_off_engaged = true;
                commands.push(SwitchCommand::RecOff);
            }
        } else {
            self.rec_off_count = 0;
            if self.rec_off_engaged {
                self.rec_off_engaged = false;
                // Moving straight from rec off to rec on must not pass through auto.
                if !self.rec_on_engaged {
                    commands.push(SwitchCommand::AutoOn);
                }
            }
        }

        commands
    }
}

/// Low-power and shutdown switch, each reading confirmed by a second one
#[derive(Debug, Default)]
pub struct PowerSwitch {
    low_power: bool,
}

impl PowerSwitch {
    /// `shutdown` and `low_power` are (first, confirming) low readings.
    pub fn poll(&mut self, shutdown: (bool, bool), low_power: (bool, bool)) -> Vec<SwitchCommand> {
        let mut commands = Vec::new();

        if shutdown.0 && shutdown.1 {
            commands.push(SwitchCommand::Shutdown);
        }

        let (first, confirm) = low_power;
        if first == confirm {
            if first && !self.low_power {
                self.low_power = true;
                commands.push(SwitchCommand::LowPowerOn);
            } else if !first && self.low_power {
                self.low_power = false;
                commands.push(SwitchCommand::LowPowerOff);
            }
        }

        commands
    }
}

fn dispatch(controller: &Controller, command: SwitchCommand) {
    info!("GPIO control: {:?}", command);
    match command {
        SwitchCommand::RecOn => controller.rec_on(),
        SwitchCommand::RecOff => controller.rec_off(),
        SwitchCommand::AutoOn => controller.auto_on(),
        SwitchCommand::LowPowerOn => controller.low_power_on(),
        SwitchCommand::LowPowerOff => controller.low_power_off(),
        SwitchCommand::Shutdown => controller.power_off(),
    }
}

/// Polling threads for the GPIO switches
pub struct GpioControl {
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    record_poll: Duration,
    power_poll: Duration,
    confirm_delay: Duration,
}

impl Default for GpioControl {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioControl {
    pub fn new() -> Self {
        Self::with_intervals(RECORD_POLL, POWER_POLL, CONFIRM_DELAY)
    }

    pub fn with_intervals(record_poll: Duration, power_poll: Duration, confirm_delay: Duration) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            threads: Vec::new(),
            record_poll,
            power_poll,
            confirm_delay,
        }
    }

    pub fn spawn_record_switch(
        &mut self,
        controller: Arc<Controller>,
        rec_on: Box<dyn PinInput>,
        rec_off: Box<dyn PinInput>,
    ) -> Result<()> {
        let running = Arc::clone(&self.running);
        let poll = self.record_poll;

        let handle = thread::Builder::new()
            .name("wurb-gpio-rec".to_string())
            .spawn(move || {
                let mut switch = RecordSwitch::default();
                while running.load(Ordering::SeqCst) {
                    thread::sleep(poll);
                    for command in switch.poll(rec_on.is_low(), rec_off.is_low()) {
                        dispatch(&controller, command);
                    }
                }
                debug!("Record switch thread finished");
            })?;

        self.threads.push(handle);
        Ok(())
    }

    pub fn spawn_power_switch(
        &mut self,
        controller: Arc<Controller>,
        low_power: Box<dyn PinInput>,
        shutdown: Box<dyn PinInput>,
    ) -> Result<()> {
        let running = Arc::clone(&self.running);
        let (poll, confirm) = (self.power_poll, self.confirm_delay);

        let handle = thread::Builder::new()
            .name("wurb-gpio-power".to_string())
            .spawn(move || {
                let mut switch = PowerSwitch::default();
                while running.load(Ordering::SeqCst) {
                    thread::sleep(poll);
                    let first = (shutdown.is_low(), low_power.is_low());
                    thread::sleep(confirm);
                    let second = (shutdown.is_low(), low_power.is_low());

                    for command in switch.poll((first.0, second.0), (first.1, second.1)) {
                        dispatch(&controller, command);
                    }
                }
                debug!("Power switch thread finished");
            })?;

        self.threads.push(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("GPIO thread panicked");
            }
        }
    }
}

impl Drop for GpioControl {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(target_os = "linux")]
mod rpi {
    use rppal::gpio::{Gpio, InputPin};

    use super::PinInput;
    use crate::error::{DaemonError, Result};

    struct RpiPin(InputPin);

    impl PinInput for RpiPin {
        fn is_low(&self) -> bool {
            self.0.is_low()
        }
    }

    pub fn open_pins(bcm_pins: &[u8]) -> Result<Vec<Box<dyn PinInput>>> {
        let gpio = Gpio::new().map_err(|e| DaemonError::Gpio(e.to_string()))?;
        bcm_pins
            .iter()
            .map(|&bcm| {
                let pin = gpio
                    .get(bcm)
                    .map_err(|e| DaemonError::Gpio(format!("BCM {}: {}", bcm, e)))?;
                Ok(Box::new(RpiPin(pin.into_input_pullup())) as Box<dyn PinInput>)
            })
            .collect()
    }
}

/// Open BCM pins as pulled-up inputs.
#[cfg(target_os = "linux")]
pub fn open_pins(bcm_pins: &[u8]) -> Result<Vec<Box<dyn PinInput>>> {
    rpi::open_pins(bcm_pins)
}

#[cfg(not(target_os = "linux"))]
pub fn open_pins(_bcm_pins: &[u8]) -> Result<Vec<Box<dyn PinInput>>> {
    Err(DaemonError::Gpio("GPIO is only available on Linux".to_string()))
}
