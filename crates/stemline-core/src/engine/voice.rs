//! Stem voices
//!
//! A voice is one stem's playable unit: its decoded buffer, an independent
//! gain and at most one scheduled source on the mix bus.

use basedrop::Shared;

use super::bus::{BusHandle, ScheduledSource, VoiceGain};
use super::command::BusCommand;
use super::gc_handle;
use crate::audio::{PlaybackError, PlaybackResult};
use crate::loader::SharedBuffer;
use crate::types::StemName;

/// Token for the source a voice currently has scheduled on the mix bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceHandle {
    generation: u64,
}

impl SourceHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Playback state of one stem
pub struct StemVoice {
    name: StemName,
    buffer: SharedBuffer,
    gain: Shared<VoiceGain>,
    slot: usize,
    active: Option<SourceHandle>,
}

impl StemVoice {
    /// Create an unmuted voice playing through mix bus slot `slot`
    pub(crate) fn new(name: StemName, buffer: SharedBuffer, slot: usize) -> Self {
        Self {
            name,
            buffer,
            gain: Shared::new(&gc_handle(), VoiceGain::default()),
            slot,
            active: None,
        }
    }

    pub fn name(&self) -> &StemName {
        &self.name
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Mute or unmute; heard from the next rendered block, scheduling untouched
    pub fn set_muted(&self, muted: bool) {
        self.gain.set(if muted { 0.0 } else { 1.0 });
    }

    pub fn is_muted(&self) -> bool {
        self.gain.get() == 0.0
    }

    pub fn gain_level(&self) -> f32 {
        self.gain.get()
    }

    pub fn active_source(&self) -> Option<SourceHandle> {
        self.active
    }

    /// Schedule a new source that starts sounding at clock frame `at_frame`,
    /// reading from `from_offset` seconds into the buffer
    ///
    /// Any source this voice already has is ended first.
    pub(crate) fn begin_playback(
        &mut self,
        bus: &mut BusHandle,
        at_frame: u64,
        from_offset: f64,
        generation: u64,
    ) -> PlaybackResult<()> {
        self.end_playback(bus);

        let source = ScheduledSource::new(
            Shared::clone(&self.buffer),
            Shared::clone(&self.gain),
            at_frame,
            self.buffer.frame_at(from_offset),
            generation,
        );

        bus.send(BusCommand::Start {
            slot: self.slot,
            source,
        })
        .map_err(|_| PlaybackError::CommandQueueFull)?;

        self.active = Some(SourceHandle { generation });
        Ok(())
    }

    /// Forget the current source after the bus reported it finished
    pub(crate) fn source_ended(&mut self, generation: u64) {
        if self.active.map(|h| h.generation) == Some(generation) {
            self.active = None;
        }
    }

    /// Stop and release the current source; no-op when none is scheduled
    ///
    /// A full queue drops the stop command. Callers retire the source's
    /// generation on the bus as well, so it is silenced either way.
    pub(crate) fn end_playback(&mut self, bus: &mut BusHandle) {
        if self.active.take().is_none() {
            return;
        }

        if bus.send(BusCommand::Stop { slot: self.slot }).is_err() {
            log::debug!(
                "Command queue full, stem '{}' is left to the generation fence",
                self.name
            );
        }
    }
}
