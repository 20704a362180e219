//! GPIO and mouse control threads driving a controller

mod common;

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use common::{default_rig, wait_for};
use wurb_daemon::controller::Mode;
use wurb_daemon::gpio::{GpioControl, PinInput};
use wurb_daemon::mouse::{GestureTracker, MouseControl};

const TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Default)]
struct FakePin(Arc<AtomicBool>);

impl FakePin {
    fn set_low(&self, low: bool) {
        self.0.store(low, Ordering::SeqCst);
    }
}

impl PinInput for FakePin {
    fn is_low(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[test]
fn test_record_switch_thread() {
    let r = default_rig();
    let rec_on = FakePin::default();
    let rec_off = FakePin::default();

    let mut gpio = GpioControl::with_intervals(
        Duration::from_millis(5),
        Duration::from_millis(20),
        Duration::from_millis(1),
    );
    gpio.spawn_record_switch(
        r.controller.clone(),
        Box::new(rec_on.clone()),
        Box::new(rec_off.clone()),
    )
    .unwrap();

    rec_on.set_low(true);
    assert!(wait_for(TIMEOUT, || r.controller.mode() == Some(Mode::RecOn)));
    assert!(r.controller.is_recording());

    rec_on.set_low(false);
    assert!(wait_for(TIMEOUT, || r.controller.mode() == Some(Mode::AutoOn)));

    rec_off.set_low(true);
    assert!(wait_for(TIMEOUT, || r.controller.mode() == Some(Mode::RecOff)));

    gpio.stop();
    assert_eq!(r.recorder.starts(), 1);
}

#[test]
fn test_power_switch_thread() {
    let r = default_rig();
    let low_power = FakePin::default();
    let shutdown = FakePin::default();

    let mut gpio = GpioControl::with_intervals(
        Duration::from_millis(5),
        Duration::from_millis(10),
        Duration::from_millis(1),
    );
    gpio.spawn_power_switch(
        r.controller.clone(),
        Box::new(low_power.clone()),
        Box::new(shutdown.clone()),
    )
    .unwrap();

    low_power.set_low(true);
    assert!(wait_for(TIMEOUT, || r.system.calls().len() == 2));
    assert_eq!(r.system.calls(), vec!["wifi_off", "hdmi_off"]);

    low_power.set_low(false);
    assert!(wait_for(TIMEOUT, || r.system.calls().len() == 4));

    shutdown.set_low(true);
    assert!(wait_for(TIMEOUT, || r.controller.is_quitting()));
    assert!(r.system.calls().contains(&"shutdown"));

    gpio.stop();
}

/// Delivers one mouse packet per read, blocking like the device does.
struct PacketReader {
    packets: mpsc::Receiver<[u8; 3]>,
}

impl Read for PacketReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.packets.recv() {
            Ok(packet) => {
                let n = buf.len().min(packet.len());
                buf[..n].copy_from_slice(&packet[..n]);
                Ok(n)
            }
            Err(_) => Ok(0),
        }
    }
}

#[test]
fn test_mouse_buttons_drive_controller() {
    let r = default_rig();
    let (tx, rx) = mpsc::channel();

    let mut mouse = MouseControl::start_with_reader(
        r.controller.clone(),
        PacketReader { packets: rx },
        GestureTracker::new(Duration::from_millis(60), Duration::from_millis(20)),
        Duration::from_millis(5),
    )
    .unwrap();

    tx.send([0x09, 0, 0]).unwrap();
    assert!(wait_for(TIMEOUT, || r.controller.mode() == Some(Mode::RecOn)));

    tx.send([0x08, 0, 0]).unwrap();
    tx.send([0x0c, 0, 0]).unwrap();
    assert!(wait_for(TIMEOUT, || r.controller.mode() == Some(Mode::AutoOn)));

    tx.send([0x08, 0, 0]).unwrap();
    tx.send([0x0a, 0, 0]).unwrap();
    assert!(wait_for(TIMEOUT, || r.controller.mode() == Some(Mode::RecOff)));

    tx.send([0x08, 0, 0]).unwrap();
    tx.send([0x0b, 0, 0]).unwrap();
    assert!(wait_for(TIMEOUT, || r.controller.is_quitting()));
    assert_eq!(r.system.calls(), vec!["shutdown"]);

    drop(tx);
    mouse.stop();
}
