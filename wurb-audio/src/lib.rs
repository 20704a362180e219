//! WURB Audio Capture
//!
//! Ultrasonic sound capture into rotating, geotagged wave files.
//!
//! ## Architecture
//!
//! ```text
//! Audio Device (cpal)
//!   │
//!   ├─> capture thread ──> SampleQueue (lock-free ringbuf)
//!   │                          │
//!   │                          └─> writer thread ──> WaveTarget (hound)
//!   │                                                  │
//!   │                                                  └─> WURB_<time>_<pos>_<type>.wav
//!   │
//!   └─> SoundRecorder (start / stop / stats)
//! ```
//!
//! Time-expanded recordings (`TExxx`) keep the samples untouched and only
//! write a sample rate ten times lower into the wave header.

pub mod buffer;
pub mod capture;
pub mod error;
pub mod format;
pub mod recorder;
pub mod source;
pub mod wave;

pub use buffer::{SampleConsumer, SampleProducer, SampleQueue};
pub use capture::{find_device_index, list_devices, CpalSource, DeviceInfo};
pub use error::{AudioError, Result};
pub use format::{Channels, RecordingFormat, RecordingType};
pub use recorder::{RecorderStats, SoundRecorder};
pub use source::{AudioSource, CaptureStream};
pub use wave::{LocalClockStamp, NameStamp, TargetSettings, WaveTarget};
