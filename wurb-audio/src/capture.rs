//! Sound-card capture with cpal
//!
//! Ultrasonic USB microphones such as the Pettersson M500-384 show up as
//! ordinary ALSA capture devices, so one cpal source covers them all.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{AudioError, Result};
use crate::format::RecordingFormat;
use crate::source::{AudioSource, CaptureStream};

/// Callback buffers waiting for the capture thread before new ones are dropped
const CALLBACK_QUEUE_DEPTH: usize = 64;

/// Audio device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    pub max_input_channels: u16,
    pub default_sample_rate: u32,
}

/// List all input devices of the default host
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    for (index, device) in host
        .input_devices()
        .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?
        .enumerate()
    {
        let name = device
            .name()
            .unwrap_or_else(|_| format!("Unknown Device {}", index));

        let (max_input_channels, default_sample_rate) = device
            .default_input_config()
            .map(|c| (c.channels(), c.sample_rate().0))
            .unwrap_or((0, 0));

        devices.push(DeviceInfo {
            index,
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            max_input_channels,
            default_sample_rate,
        });
    }

    Ok(devices)
}

/// Index of the first input device whose name contains `part_of_name`
pub fn find_device_index(part_of_name: &str) -> Result<Option<usize>> {
    let devices = list_devices()?;
    Ok(first_match(devices.iter().map(|d| d.name.as_str()), part_of_name)
        .map(|position| devices[position].index))
}

fn first_match<'a>(names: impl IntoIterator<Item = &'a str>, part_of_name: &str) -> Option<usize> {
    names.into_iter().position(|name| name.contains(part_of_name))
}

/// Capture from a sound card through cpal.
///
/// The device is looked up on every `open`, so a microphone plugged in after
/// start-up is found by the next recording session.
pub struct CpalSource {
    device_name: String,
}

impl CpalSource {
    /// `device_name` is matched as a substring; empty or `default` picks the default input.
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }

    fn select_device(&self) -> Result<Device> {
        let host = cpal::default_host();
        let wanted = self.device_name.trim();

        if wanted.is_empty() || wanted.eq_ignore_ascii_case("default") {
            return host
                .default_input_device()
                .ok_or_else(|| AudioError::device("No default input device found"));
        }

        let index = find_device_index(wanted)?
            .ok_or_else(|| AudioError::device(format!("No input device matching '{}'", wanted)))?;
        debug!("Input device '{}' found at index {}", wanted, index);

        host.input_devices()
            .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?
            .nth(index)
            .ok_or_else(|| AudioError::device(format!("Input device {} disappeared", index)))
    }
}

/// Preferred sample format for a device that can do `format`
fn pick_sample_format(device: &Device, format: &RecordingFormat) -> Result<SampleFormat> {
    let supported: Vec<SampleFormat> = device
        .supported_input_configs()
        .map_err(|e| AudioError::device(format!("Failed to query device configs: {}", e)))?
        .filter(|range| {
            range.channels() == format.channels
                && range.min_sample_rate().0 <= format.capture_rate_hz
                && range.max_sample_rate().0 >= format.capture_rate_hz
        })
        .map(|range| range.sample_format())
        .collect();

    [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16]
        .into_iter()
        .find(|f| supported.contains(f))
        .ok_or_else(|| {
            AudioError::device(format!(
                "Device does not support {} channel(s) at {} Hz",
                format.channels, format.capture_rate_hz
            ))
        })
}

impl AudioSource for CpalSource {
    fn name(&self) -> String {
        if self.device_name.is_empty() {
            "default".to_string()
        } else {
            self.device_name.clone()
        }
    }

    fn open(&self, format: &RecordingFormat) -> Result<Box<dyn CaptureStream>> {
        let device = self.select_device()?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let sample_format = pick_sample_format(&device, format)?;

        let stream_config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.capture_rate_hz),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = mpsc::sync_channel(CALLBACK_QUEUE_DEPTH);
        let shared = StreamShared::default();

        let stream = match sample_format {
            SampleFormat::I16 => build_stream::<i16, _>(&device, &stream_config, tx, &shared, |s| s),
            SampleFormat::F32 => build_stream::<f32, _>(&device, &stream_config, tx, &shared, |s| {
                (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
            }),
            SampleFormat::U16 => build_stream::<u16, _>(&device, &stream_config, tx, &shared, |s| {
                (s as i32 - 32_768) as i16
            }),
            other => Err(AudioError::device(format!(
                "Unsupported sample format {:?}",
                other
            ))),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::stream(format!("Failed to start stream: {}", e)))?;

        info!(
            "Capture started: {} ({} Hz, {} ch, {:?})",
            device_name, format.capture_rate_hz, format.channels, sample_format
        );

        Ok(Box::new(CpalStream {
            _stream: stream,
            rx,
            shared,
        }))
    }
}

#[derive(Clone, Default)]
struct StreamShared {
    dropped: Arc<AtomicU64>,
    fatal: Arc<Mutex<Option<String>>>,
}

fn build_stream<T, F>(
    device: &Device,
    config: &StreamConfig,
    tx: SyncSender<Vec<i16>>,
    shared: &StreamShared,
    convert: F,
) -> Result<Stream>
where
    T: SizedSample,
    F: Fn(T) -> i16 + Send + 'static,
{
    let dropped = Arc::clone(&shared.dropped);
    let fatal = Arc::clone(&shared.fatal);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let block: Vec<i16> = data.iter().copied().map(&convert).collect();
                if tx.try_send(block).is_err() {
                    dropped.fetch_add(data.len() as u64, Ordering::Relaxed);
                }
            },
            move |err| match err {
                cpal::StreamError::DeviceNotAvailable => {
                    error!("Audio device disappeared");
                    *fatal.lock() = Some(err.to_string());
                }
                other => warn!("Audio stream error: {}", other),
            },
            None,
        )
        .map_err(|e| AudioError::stream(format!("Failed to build stream: {}", e)))
}

struct CpalStream {
    _stream: Stream,
    rx: Receiver<Vec<i16>>,
    shared: StreamShared,
}

impl CaptureStream for CpalStream {
    fn next_block(&mut self, timeout: Duration) -> Result<Option<Vec<i16>>> {
        if let Some(reason) = self.shared.fatal.lock().take() {
            return Err(AudioError::stream(reason));
        }

        match self.rx.recv_timeout(timeout) {
            Ok(block) => Ok(Some(block)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(AudioError::stream("capture callback disconnected"))
            }
        }
    }
    fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let dropped = self.shared.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!("Capture callback dropped {} samples", dropped);
        } else {
            debug!("Capture stream closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_by_substring() {
        let names = ["HDA Intel PCH", "M500-384 USB", "UltraMic 250K"];
        assert_eq!(first_match(names, "M500"), Some(1));
        assert_eq!(first_match(names, "Ultra"), Some(2));
        assert_eq!(first_match(names, "Pettersson"), None);
    }

    #[test]
    fn test_first_match_takes_earliest() {
        let names = ["USB Audio #1", "USB Audio #2"];
        assert_eq!(first_match(names, "USB Audio"), Some(0));
    }
}
