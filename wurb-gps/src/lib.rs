//! WURB GPS
//!
//! Time and position from a local gpsd, for file names and for working out
//! when the sun sets where the recorder is standing.

pub mod error;
pub mod fix;
pub mod protocol;
pub mod reader;
pub mod zone;

pub use error::{GpsError, Result};
pub use fix::{format_position, GpsFix, NO_POSITION};
pub use reader::{GpsHandle, GpsReader, DEFAULT_GPSD_ADDR};
pub use zone::Zone;
