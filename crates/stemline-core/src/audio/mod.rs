//! Audio output backends for Stemline
//!
//! Provides the output device the engine schedules against:
//! - **cpal**: cross-platform device output (feature `cpal-backend`, default)
//! - **offline**: simulated clock rendering into memory, for tests and bouncing
//!
//! # Architecture
//!
//! The output follows a lock-free design for real-time safety:
//!
//! - **Caller thread**: the transport pushes scheduling commands into a ringbuffer
//! - **Audio thread**: owns the mix bus exclusively and drains the commands
//! - **Atomics**: the bus clock and gains are shared without locks
//!
//! # Example Usage
//!
//! ```ignore
//! use stemline_core::audio::{start_output, OutputConfig};
//!
//! let output = start_output(&OutputConfig::default())?;
//! let engine = StemEngine::new(output, FileFetcher::new(), EngineConfig::default());
//! ```

mod backend;
mod config;
mod error;
mod offline;

#[cfg(feature = "cpal-backend")]
mod cpal_backend;
#[cfg(feature = "cpal-backend")]
mod device;

pub use backend::{start_offline, start_output, OutputHandle, OutputSystem};
pub use config::{
    BufferSize, DeviceId, OutputConfig, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
};
pub use error::{AudioError, AudioResult, PlaybackError, PlaybackResult};
pub use offline::{OfflineDriver, OfflineHandle};

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::CpalOutputHandle;
#[cfg(feature = "cpal-backend")]
pub use device::{find_device_by_id, get_output_devices, AudioDevice};
