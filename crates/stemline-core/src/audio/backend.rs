//! Output backend dispatch
//!
//! Every backend runs the same [`MixBus`](crate::engine::MixBus) on its audio
//! thread and hands the engine a [`BusHandle`] plus an [`OutputHandle`] that
//! controls the device:
//! - **cpal**: real output devices (feature `cpal-backend`)
//! - **offline**: manually advanced clock rendering into memory

use super::config::OutputConfig;
use super::error::{AudioResult, PlaybackResult};
use super::offline::{OfflineDriver, OfflineHandle};
use crate::engine::BusHandle;

#[cfg(not(feature = "cpal-backend"))]
use super::error::AudioError;

/// A started output backend
///
/// Contains the device handle and the transport-side end of the mix bus.
pub struct OutputSystem {
    /// Handle controlling the device (drop to close it)
    pub handle: OutputHandle,
    /// Transport-side endpoint of the mix bus
    pub bus: BusHandle,
    /// Sample rate the device runs at
    pub sample_rate: u32,
    /// Buffer size in frames
    pub buffer_size: u32,
    /// Output latency in milliseconds (one-way)
    pub latency_ms: f32,
}

/// Handle to an output device
///
/// Devices start suspended. The transport activates them on `play` and
/// suspends them on `pause`, which also freezes the bus clock.
pub enum OutputHandle {
    /// cpal stream on a real device
    #[cfg(feature = "cpal-backend")]
    Cpal(super::cpal_backend::CpalOutputHandle),

    /// In-memory renderer driven by an [`OfflineDriver`]
    Offline(OfflineHandle),
}

impl OutputHandle {
    /// Start (or resume) pulling audio from the mix bus
    pub fn activate(&mut self) -> PlaybackResult<()> {
        match self {
            #[cfg(feature = "cpal-backend")]
            OutputHandle::Cpal(h) => h.activate(),
            OutputHandle::Offline(h) => h.activate(),
        }
    }

    /// Stop pulling audio; the bus clock stands still until the next activation
    pub fn suspend(&mut self) -> AudioResult<()> {
        match self {
            #[cfg(feature = "cpal-backend")]
            OutputHandle::Cpal(h) => h.suspend(),
            OutputHandle::Offline(h) => {
                h.suspend();
                Ok(())
            }
        }
    }

    /// Release the device; later activations fail with `DeviceUnavailable`
    pub fn close(&mut self) {
        match self {
            #[cfg(feature = "cpal-backend")]
            OutputHandle::Cpal(h) => h.close(),
            OutputHandle::Offline(h) => h.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            #[cfg(feature = "cpal-backend")]
            OutputHandle::Cpal(h) => h.is_closed(),
            OutputHandle::Offline(h) => h.is_closed(),
        }
    }
}

/// Open the configured output device (or the system default)
///
/// The stream is built and left suspended until the first `play`.
pub fn start_output(config: &OutputConfig) -> AudioResult<OutputSystem> {
    #[cfg(feature = "cpal-backend")]
    {
        super::cpal_backend::start_output(config)
    }

    #[cfg(not(feature = "cpal-backend"))]
    {
        let _ = config;
        Err(AudioError::BackendUnavailable)
    }
}

/// Start an offline backend at `sample_rate`
///
/// Nothing is rendered until the returned driver is advanced.
pub fn start_offline(sample_rate: u32) -> (OutputSystem, OfflineDriver) {
    super::offline::start_offline(sample_rate)
}
