//! USB mouse as a field control
//!
//! Reads raw PS/2-style packets from `/dev/input/mice`. Holding a button
//! triggers a command once per press:
//!
//! | Buttons        | Hold | Command   |
//! |----------------|------|-----------|
//! | left and right | 5 s  | power off |
//! | left           | 1 s  | rec on    |
//! | middle         | 1 s  | auto on   |
//! | right          | 1 s  | rec off   |

use parking_lot::Mutex;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::controller::Controller;
use crate::error::Result;

const BUTTON_LEFT: u8 = 0x1;
const BUTTON_RIGHT: u8 = 0x2;
const BUTTON_MIDDLE: u8 = 0x4;

/// Hold check period
pub const ACTION_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    LeftAndRight,
    Left,
    Middle,
    Right,
}

impl Gesture {
    /// Decode the button byte of a mouse packet. Combined presses win over
    /// single ones, left wins over middle, middle over right.
    pub fn from_buttons(buttons: u8) -> Option<Self> {
        let left = buttons & BUTTON_LEFT != 0;
        let right = buttons & BUTTON_RIGHT != 0;
        let middle = buttons & BUTTON_MIDDLE != 0;

        if left && right {
            Some(Gesture::LeftAndRight)
        } else if left {
            Some(Gesture::Left)
        } else if middle {
            Some(Gesture::Middle)
        } else if right {
            Some(Gesture::Right)
        } else {
            None
        }
    }
}

/// Press tracking between the packet reader and the hold checker
#[derive(Debug)]
pub struct GestureTracker {
    pressed: Option<(Gesture, Instant)>,
    last_fired: Option<Gesture>,
    hold_both: Duration,
    hold_single: Duration,
}

impl GestureTracker {
    pub fn new(hold_both: Duration, hold_single: Duration) -> Self {
        Self {
            pressed: None,
            last_fired: None,
            hold_both,
            hold_single,
        }
    }

    /// Record the button byte of a packet received at `now`.
    pub fn on_buttons(&mut self, buttons: u8, now: Instant) {
        match Gesture::from_buttons(buttons) {
            Some(gesture) => {
                if self.pressed.map(|(g, _)| g) != Some(gesture) {
                    self.pressed = Some((gesture, now));
                }
            }
            None => {
                self.pressed = None;
                self.last_fired = None;
            }
        }
    }

    /// Gesture whose hold time has passed and that has not fired yet
    pub fn check(&mut self, now: Instant) -> Option<Gesture> {
        let (gesture, since) = self.pressed?;
        let hold = match gesture {
            Gesture::LeftAndRight => self.hold_both,
            _ => self.hold_single,
        };

        if now.saturating_duration_since(since) >= hold && self.last_fired != Some(gesture) {
            self.last_fired = Some(gesture);
            return Some(gesture);
        }
        None
    }
}

fn dispatch(controller: &Controller, gesture: Gesture) {
    info!("Mouse control: {:?}", gesture);
    match gesture {
        Gesture::LeftAndRight => controller.power_off(),
        Gesture::Left => controller.rec_on(),
        Gesture::Middle => controller.auto_on(),
        Gesture::Right => controller.rec_off(),
    }
}

pub struct MouseControl {
    running: Arc<AtomicBool>,
    action_thread: Option<JoinHandle<()>>,
}

impl MouseControl {
    /// Open the mouse device and start watching it.
    pub fn start(
        controller: Arc<Controller>,
        device: &Path,
        hold_both: Duration,
        hold_single: Duration,
    ) -> Result<Self> {
        let file = File::open(device)?;
        info!("Mouse control on {}", device.display());
        Self::start_with_reader(controller, file, GestureTracker::new(hold_both, hold_single), ACTION_POLL)
    }

    pub fn start_with_reader<R: Read + Send + 'static>(
        controller: Arc<Controller>,
        mut reader: R,
        tracker: GestureTracker,
        poll: Duration,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let tracker = Arc::new(Mutex::new(tracker));

        // Blocking reads cannot be interrupted; this thread is detached and
        // ends with the process or on end of input.
        let read_tracker = Arc::clone(&tracker);
        let read_running = Arc::clone(&running);
        thread::Builder::new()
            .name("wurb-mouse-read".to_string())
            .spawn(move || {
                let mut packet = [0u8; 3];
                while read_running.load(Ordering::SeqCst) {
                    match reader.read_exact(&mut packet) {
                        Ok(()) => read_tracker.lock().on_buttons(packet[0], Instant::now()),
                        Err(e) => {
                            warn!("Mouse input closed: {}", e);
                            break;
                        }
                    }
                }
            })?;

        let action_running = Arc::clone(&running);
        let action_thread = thread::Builder::new()
            .name("wurb-mouse-action".to_string())
            .spawn(move || {
                while action_running.load(Ordering::SeqCst) {
                    thread::sleep(poll);
                    let fired = tracker.lock().check(Instant::now());
                    if let Some(gesture) = fired {
                        dispatch(&controller, gesture);
                    }
                }
                debug!("Mouse action thread finished");
            })?;

        Ok(Self {
            running,
            action_thread: Some(action_thread),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.action_thread.take() {
            if handle.join().is_err() {
                warn!("Mouse action thread panicked");
            }
        }
    }
}

impl Drop for MouseControl {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> GestureTracker {
        GestureTracker::new(Duration::from_secs(5), Duration::from_secs(1))
    }

    #[test]
    fn test_button_priority() {
        assert_eq!(Gesture::from_buttons(0x08), None);
        assert_eq!(Gesture::from_buttons(0x09), Some(Gesture::Left));
        assert_eq!(Gesture::from_buttons(0x0a), Some(Gesture::Right));
        assert_eq!(Gesture::from_buttons(0x0c), Some(Gesture::Middle));
        assert_eq!(Gesture::from_buttons(0x0b), Some(Gesture::LeftAndRight));
        assert_eq!(Gesture::from_buttons(0x0f), Some(Gesture::LeftAndRight));
        assert_eq!(Gesture::from_buttons(0x05), Some(Gesture::Left));
        assert_eq!(Gesture::from_buttons(0x06), Some(Gesture::Middle));
    }

    #[test]
    fn test_fires_once_per_press() {
        let mut t = tracker();
        let t0 = Instant::now();

        t.on_buttons(BUTTON_LEFT, t0);
        assert_eq!(t.check(t0 + Duration::from_millis(900)), None);
        assert_eq!(t.check(t0 + Duration::from_millis(1000)), Some(Gesture::Left));
        assert_eq!(t.check(t0 + Duration::from_secs(3)), None);

        // Movement packets with the button still down do not restart the hold
        t.on_buttons(BUTTON_LEFT, t0 + Duration::from_secs(4));
        assert_eq!(t.check(t0 + Duration::from_secs(6)), None);

        t.on_buttons(0, t0 + Duration::from_secs(7));
        t.on_buttons(BUTTON_LEFT, t0 + Duration::from_secs(8));
        assert_eq!(t.check(t0 + Duration::from_secs(9)), Some(Gesture::Left));
    }

    #[test]
    fn test_both_buttons_need_long_hold() {
        let mut t = tracker();
        let t0 = Instant::now();

        t.on_buttons(BUTTON_LEFT, t0);
        t.on_buttons(BUTTON_LEFT | BUTTON_RIGHT, t0 + Duration::from_millis(200));
        assert_eq!(t.check(t0 + Duration::from_secs(2)), None);
        assert_eq!(t.check(t0 + Duration::from_secs(5)), None);
        assert_eq!(
            t.check(t0 + Duration::from_millis(5200)),
            Some(Gesture::LeftAndRight)
        );
    }

    #[test]
    fn test_switching_button_restarts_hold() {
        let mut t = tracker();
        let t0 = Instant::now();

        t.on_buttons(BUTTON_RIGHT, t0);
        t.on_buttons(BUTTON_MIDDLE, t0 + Duration::from_millis(800));
        assert_eq!(t.check(t0 + Duration::from_millis(1200)), None);
        assert_eq!(t.check(t0 + Duration::from_millis(1800)), Some(Gesture::Middle));
    }

    #[test]
    fn test_release_before_hold_does_nothing() {
        let mut t = tracker();
        let t0 = Instant::now();

        t.on_buttons(BUTTON_RIGHT, t0);
        t.on_buttons(0, t0 + Duration::from_millis(500));
        assert_eq!(t.check(t0 + Duration::from_secs(2)), None);
    }
}
