//! Appliance lifecycle: wire the recorder, GPS, scheduler and controls
//! together, and take them down again in order.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use wurb_audio::{list_devices, CpalSource, SoundRecorder};
use wurb_gps::{GpsHandle, GpsReader};

use crate::config::DaemonConfig;
use crate::controller::Controller;
use crate::gpio::{self, GpioControl};
use crate::housekeeping::DiskMonitor;
use crate::ipc::{IpcContext, IpcServer};
use crate::mouse::MouseControl;
use crate::schedule::Scheduler;
use crate::stamp::GpsStamp;
use crate::system::ShellActions;

pub struct Appliance {
    config: DaemonConfig,
    controller: Arc<Controller>,
    gps_reader: Option<GpsReader>,
    gps: GpsHandle,
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    gpio: Option<GpioControl>,
    mouse: Option<MouseControl>,
}

impl Appliance {
    /// Build and start everything. Returns once all services run.
    pub async fn start(config: DaemonConfig) -> Result<Self> {
        if config.startup_delay_s > 0 {
            info!("⏳ Waiting {} s for devices to settle", config.startup_delay_s);
            tokio::time::sleep(Duration::from_secs(config.startup_delay_s)).await;
        }

        log_input_devices();

        let zone = config.zone()?;
        info!("🕒 Time zone: {}", zone);

        let (gps_reader, gps) = if config.location.use_gps {
            let mut reader = GpsReader::new(config.location.gpsd_address.clone());
            reader.start();
            let handle = reader.handle();
            (Some(reader), handle)
        } else {
            info!("GPS disabled, using configured position and system clock");
            (None, GpsHandle::default())
        };

        let recorder = SoundRecorder::new(
            Arc::new(CpalSource::new(config.recording.sound_card.clone())),
            config.target_settings()?,
            Arc::new(GpsStamp::new(gps.clone(), zone)),
            config.recording.queue_seconds,
        )
        .context("Failed to create sound recorder")?;
        info!(
            "🎙️ Recorder: {} ({}), files in {}",
            config.recording.sound_card,
            config.recording.recording_type,
            recorder.settings().dir_path.display()
        );

        let controller = Arc::new(Controller::new(
            Arc::new(recorder),
            Arc::new(ShellActions::from_config(&config.power)),
            config.controller_settings(),
        ));

        let (stop_tx, _) = watch::channel(false);
        let mut appliance = Self {
            config,
            controller,
            gps_reader,
            gps,
            stop_tx,
            tasks: Vec::new(),
            gpio: None,
            mouse: None,
        };

        if let Err(e) = appliance.start_services().await {
            error!("Start-up failed: {:#}", e);
            if let Err(e) = appliance.controller.run_blocking(|c| c.rec_off()).await {
                error!("Failed to stop recorder: {}", e);
            }
            appliance.shutdown().await;
            return Err(e);
        }

        Ok(appliance)
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    async fn start_services(&mut self) -> Result<()> {
        let config = self.config.clone();

        if config.scheduler.use_scheduler {
            let scheduler = Scheduler::new(config.scheduler_settings()?, self.gps.clone());
            self.tasks.push(tokio::spawn(
                scheduler.run(Arc::clone(&self.controller), self.stop_tx.subscribe()),
            ));
            if let Err(e) = self.controller.run_blocking(|c| c.auto_on()).await {
                error!("Failed to activate auto mode: {}", e);
            }
        }

        self.start_controls(&config)?;

        let socket_path = config.socket_path()?;
        let server = IpcServer::new(
            &socket_path,
            IpcContext {
                controller: Arc::clone(&self.controller),
                gps: self.gps.clone(),
            },
        )
        .context("Failed to start IPC server")?;
        let mut stop = self.stop_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            tokio::select! {
                result = server.run() => {
                    if let Err(e) = result {
                        error!("IPC server error: {}", e);
                    }
                }
                _ = stop.changed() => {}
            }
        }));

        let monitor = DiskMonitor::new(config.wave_file_dir()?, config.power.min_free_disk_mb);
        self.tasks.push(tokio::spawn(monitor.run(
            Arc::clone(&self.controller),
            Duration::from_secs(config.power.disk_check_interval_s),
            self.stop_tx.subscribe(),
        )));

        Ok(())
    }

    fn start_controls(&mut self, config: &DaemonConfig) -> Result<()> {
        let controls = &config.controls;

        if controls.use_gpio_record_switch || controls.use_gpio_power_switch {
            let mut gpio = GpioControl::new();

            if controls.use_gpio_record_switch {
                let mut pins = gpio::open_pins(&[controls.gpio_rec_on, controls.gpio_rec_off])?;
                let rec_off = pins.pop().context("rec_off pin missing")?;
                let rec_on = pins.pop().context("rec_on pin missing")?;
                gpio.spawn_record_switch(Arc::clone(&self.controller), rec_on, rec_off)?;
                info!(
                    "🎚️ GPIO record switch on BCM {} / {}",
                    controls.gpio_rec_on, controls.gpio_rec_off
                );
            }

            if controls.use_gpio_power_switch {
                let mut pins =
                    gpio::open_pins(&[controls.gpio_low_power, controls.gpio_shutdown])?;
                let shutdown = pins.pop().context("shutdown pin missing")?;
                let low_power = pins.pop().context("low power pin missing")?;
                gpio.spawn_power_switch(Arc::clone(&self.controller), low_power, shutdown)?;
                info!(
                    "🔋 GPIO power switch on BCM {} / {}",
                    controls.gpio_low_power, controls.gpio_shutdown
                );
            }

            self.gpio = Some(gpio);
        }

        if controls.use_mouse {
            let mouse = MouseControl::start(
                Arc::clone(&self.controller),
                Path::new(&controls.mouse_device),
                Duration::from_secs_f64(controls.mouse_left_and_right_s.max(0.0)),
                Duration::from_secs_f64(controls.mouse_button_s.max(0.0)),
            )
            .with_context(|| format!("Failed to open mouse {}", controls.mouse_device))?;
            self.mouse = Some(mouse);
        }

        Ok(())
    }

    /// Stop controls first so nothing restarts the recorder, then the rest.
    pub async fn shutdown(&mut self) {
        if let Some(mut gpio) = self.gpio.take() {
            gpio.stop();
        }
        if let Some(mut mouse) = self.mouse.take() {
            mouse.stop();
        }

        let _ = self.stop_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Task ended abnormally: {}", e);
            }
        }

        if let Err(e) = self.controller.run_blocking(|c| c.shutdown()).await {
            error!("Failed to stop recorder: {}", e);
        }

        if let Some(reader) = self.gps_reader.as_mut() {
            reader.stop().await;
        }
    }
}

fn log_input_devices() {
    match list_devices() {
        Ok(devices) if devices.is_empty() => warn!("⚠️ No input devices found"),
        Ok(devices) => {
            for device in devices {
                info!(
                    "  [{}] {}{} ({} ch, {} Hz)",
                    device.index,
                    device.name,
                    if device.is_default { " (default)" } else { "" },
                    device.max_input_channels,
                    device.default_sample_rate
                );
            }
        }
        Err(e) => warn!("Could not list input devices: {}", e),
    }
}
