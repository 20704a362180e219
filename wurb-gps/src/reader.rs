//! Background gpsd client

use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fix::GpsFix;
use crate::protocol::{parse_report, Report, WATCH_COMMAND};
use crate::zone::Zone;

/// gpsd's standard port on the local host
pub const DEFAULT_GPSD_ADDR: &str = "localhost:2947";

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Shared view of the latest fix, readable from any thread without awaiting
#[derive(Clone, Default)]
pub struct GpsHandle {
    fix: Arc<RwLock<GpsFix>>,
    connected: Arc<AtomicBool>,
}

impl GpsHandle {
    pub fn fix(&self) -> GpsFix {
        self.fix.read().clone()
    }

    /// Overwrite the fix, e.g. from another time source
    pub fn set_fix(&self, fix: GpsFix) {
        *self.fix.write() = fix;
    }

    pub fn clear(&self) {
        *self.fix.write() = GpsFix::default();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn time_utc(&self) -> Option<DateTime<Utc>> {
        self.fix.read().time_utc
    }

    pub fn time_local(&self, zone: &Zone) -> Option<DateTime<FixedOffset>> {
        self.time_utc().map(|t| zone.to_local(t))
    }

    /// `20160802T235006+0200` style, as used in file names
    pub fn time_local_string(&self, zone: &Zone) -> Option<String> {
        self.time_local(zone)
            .map(|t| t.format("%Y%m%dT%H%M%S%z").to_string())
    }

    pub fn latitude(&self) -> Option<f64> {
        self.fix.read().latitude
    }

    pub fn longitude(&self) -> Option<f64> {
        self.fix.read().longitude
    }

    pub fn latlong_string(&self) -> Option<String> {
        self.fix.read().latlong_string()
    }
}

/// Keeps a [`GpsHandle`] up to date from a gpsd daemon.
///
/// A lost connection clears the fix; the reader keeps retrying until stopped.
pub struct GpsReader {
    addr: String,
    reconnect_delay: Duration,
    handle: GpsHandle,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl GpsReader {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            handle: GpsHandle::default(),
            stop_tx: None,
            task: None,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn handle(&self) -> GpsHandle {
        self.handle.clone()
    }

    pub fn is_started(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Spawn the reader task on the current tokio runtime.
    pub fn start(&mut self) {
        if self.is_started() {
            debug!("GPS reader already started");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let addr = self.addr.clone();
        let handle = self.handle.clone();
        let delay = self.reconnect_delay;

        info!("GPS reader started ({})", addr);
        self.task = Some(tokio::spawn(run(addr, handle, delay, stop_rx)));
        self.stop_tx = Some(stop_tx);
    }

    /// Stop the reader task and clear the fix.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
            info!("GPS reader stopped");
        }
        self.handle.clear();
    }
}

impl Drop for GpsReader {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(addr: String, handle: GpsHandle, delay: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            result = session(&addr, &handle) => match result {
                Ok(()) => {
                    info!("gpsd closed the connection");
                    failures = 0;
                }
                Err(e) if failures == 0 => {
                    warn!("GPS reader: failed to read from gpsd at {}: {}", addr, e);
                    failures += 1;
                }
                Err(e) => {
                    debug!("GPS reader: retry {} failed: {}", failures, e);
                    failures = failures.saturating_add(1);
                }
            },
            _ = stop_rx.changed() => break,
        }

        handle.connected.store(false, Ordering::Relaxed);
        handle.clear();

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop_rx.changed() => break,
        }
    }

    handle.connected.store(false, Ordering::Relaxed);
    handle.clear();
}

async fn session(addr: &str, handle: &GpsHandle) -> Result<()> {
    let stream = TcpStream::connect(addr).await?;
    let (read_half, mut write_half) = stream.into_split();

    write_half.write_all(WATCH_COMMAND.as_bytes()).await?;
    write_half.flush().await?;
    handle.connected.store(true, Ordering::Relaxed);
    info!("Connected to gpsd at {}", addr);

    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_report(&line) {
            Ok(Report::Tpv(tpv)) => handle.fix.write().apply(&tpv),
            Ok(Report::Other) => {}
            Err(e) => debug!("Skipping gpsd line: {}", e),
        }
    }

    Ok(())
}
