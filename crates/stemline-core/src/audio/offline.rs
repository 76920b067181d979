//! Offline output backend
//!
//! Runs the mix bus without a device. Time only passes when the
//! [`OfflineDriver`] is advanced, which makes the engine fully
//! deterministic: tests simulate seconds of playback instantly and inspect
//! the rendered audio, and hosts can bounce a mix to memory.

use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{OutputHandle, OutputSystem};
use super::config::DEFAULT_BUFFER_SIZE;
use super::error::{PlaybackError, PlaybackResult};
use crate::engine::{bus_channel, MixBus};
use crate::types::StereoBuffer;

struct OfflineState {
    bus: MixBus,
    block: StereoBuffer,
    suspended: bool,
    closed: bool,
    fail_next_activation: Option<String>,
}

fn lock(state: &Mutex<OfflineState>) -> MutexGuard<'_, OfflineState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Device handle of the offline backend
pub struct OfflineHandle {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineHandle {
    pub(crate) fn activate(&mut self) -> PlaybackResult<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(PlaybackError::DeviceUnavailable);
        }
        if let Some(reason) = state.fail_next_activation.take() {
            return Err(PlaybackError::DeviceActivationFailed(reason));
        }
        state.suspended = false;
        Ok(())
    }

    pub(crate) fn suspend(&mut self) {
        lock(&self.state).suspended = true;
    }

    pub(crate) fn close(&mut self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.suspended = true;
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

/// Drives the simulated clock of an offline backend
pub struct OfflineDriver {
    state: Arc<Mutex<OfflineState>>,
    sample_rate: u32,
}

impl OfflineDriver {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Render `seconds` of audio (rounded to whole frames)
    pub fn advance(&self, seconds: f64) -> StereoBuffer {
        let frames = (seconds.max(0.0) * self.sample_rate as f64).round() as usize;
        self.advance_frames(frames)
    }

    /// Render `frames` frames in device-sized blocks
    ///
    /// While the device is suspended or closed the result is silence and
    /// the bus clock does not move.
    pub fn advance_frames(&self, frames: usize) -> StereoBuffer {
        let mut state = lock(&self.state);
        if state.suspended {
            return StereoBuffer::silence(frames);
        }

        let mut rendered = StereoBuffer::with_capacity(frames);
        let mut remaining = frames;
        let OfflineState { bus, block, .. } = &mut *state;

        while remaining > 0 {
            let n = remaining.min(DEFAULT_BUFFER_SIZE as usize);
            block.set_len_from_capacity(n);
            bus.process(block);
            rendered.extend_from(block);
            remaining -= n;
        }

        rendered
    }

    /// Whether the device is currently suspended (paused or never started)
    pub fn is_suspended(&self) -> bool {
        lock(&self.state).suspended
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Make the next activation fail as if the device refused to start
    pub fn fail_next_activation(&self, reason: impl Into<String>) {
        lock(&self.state).fail_next_activation = Some(reason.into());
    }

    /// Frames rendered since the backend started
    pub fn rendered_frames(&self) -> u64 {
        lock(&self.state).bus.clock().frames()
    }
}

pub(crate) fn start_offline(sample_rate: u32) -> (OutputSystem, OfflineDriver) {
    let (bus_handle, bus) = bus_channel(sample_rate);

    let state = Arc::new(Mutex::new(OfflineState {
        bus,
        block: StereoBuffer::silence(DEFAULT_BUFFER_SIZE as usize),
        suspended: true,
        closed: false,
        fail_next_activation: None,
    }));

    log::debug!("Offline output started at {}Hz", sample_rate);

    let system = OutputSystem {
        handle: OutputHandle::Offline(OfflineHandle {
            state: Arc::clone(&state),
        }),
        bus: bus_handle,
        sample_rate,
        buffer_size: DEFAULT_BUFFER_SIZE,
        latency_ms: 0.0,
    };

    (system, OfflineDriver { state, sample_rate })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_frozen_while_suspended() {
        let (mut system, driver) = start_offline(1000);
        assert!(driver.is_suspended());

        let out = driver.advance(1.0);
        assert_eq!(out.len(), 1000);
        assert_eq!(system.bus.clock().frames(), 0);

        system.handle.activate().unwrap();
        driver.advance(1.5);
        assert_eq!(system.bus.clock().frames(), 1500);

        system.handle.suspend().unwrap();
        driver.advance(1.0);
        assert_eq!(driver.rendered_frames(), 1500);
    }

    #[test]
    fn test_activation_failures() {
        let (mut system, driver) = start_offline(1000);
        driver.fail_next_activation("permission denied");
        assert_eq!(
            system.handle.activate(),
            Err(PlaybackError::DeviceActivationFailed("permission denied".to_string()))
        );
        assert!(system.handle.activate().is_ok());

        system.handle.close();
        assert!(driver.is_closed());
        assert_eq!(system.handle.activate(), Err(PlaybackError::DeviceUnavailable));
    }
}
