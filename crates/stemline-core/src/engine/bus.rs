//! Mix bus: the audio-thread side of the engine
//!
//! The [`MixBus`] lives on the output device's thread. Every block it drains
//! the command queue, sums every scheduled source into the output through
//! that source's gain, applies the master gain and advances the shared
//! [`BusClock`]. The transport talks to it exclusively through a
//! [`BusHandle`].
//!
//! Besides the command queue the two sides share a generation fence:
//! sources scheduled by a generation below the fence are dropped silently
//! at the next block. Cancelling playback therefore never depends on free
//! space in the queue.
//!
//! ```text
//! ┌──────────────────┐  BusCommand   ┌─────────────────────┐
//! │    Transport     │──────────────►│       MixBus        │
//! │   (BusHandle)    │◄──────────────│   (audio thread)    │
//! └────────┬─────────┘  SourceEnded  └──────────┬──────────┘
//!          │ frames()                           │ advance()
//!          ▼                                    ▼
//!       ┌─────────────────────────────────────────┐
//!       │            BusClock (AtomicU64)         │
//!       └─────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use basedrop::Shared;

use super::command::{BusCommand, SourceEnded, COMMAND_QUEUE_CAPACITY, EVENT_QUEUE_CAPACITY};
use crate::loader::SharedBuffer;
use crate::types::{StereoBuffer, StereoSample, MAX_VOICES};

/// Monotonic clock driven by the output device
///
/// Counts the frames the mix bus has rendered. It only moves while the
/// device is pulling audio, so suspending the device freezes it.
#[derive(Debug)]
pub struct BusClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl BusClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate,
        }
    }

    /// Frames rendered so far
    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Current clock time in seconds
    #[inline]
    pub fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn seconds_to_frames(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    pub fn frames_to_seconds(&self, frames: u64) -> f64 {
        frames as f64 / self.sample_rate as f64
    }

    fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }
}

/// Lock-free gain level shared between a voice and the audio thread
///
/// Stored as the bit pattern of an `f32` so reads on the audio thread never
/// lock.
#[derive(Debug)]
pub struct VoiceGain(AtomicU32);

impl VoiceGain {
    pub fn new(level: f32) -> Self {
        Self(AtomicU32::new(level.to_bits()))
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, level: f32) {
        self.0.store(level.to_bits(), Ordering::Relaxed);
    }
}

impl Default for VoiceGain {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// One playback instance of a decoded buffer, as seen by the audio thread
///
/// The source is silent before `start_frame`. From then on, clock frame `f`
/// reads buffer frame `offset_frame + (f - start_frame)`, so a source whose
/// start command reaches the audio thread late still plays in phase with
/// sources that were armed in time.
pub struct ScheduledSource {
    buffer: SharedBuffer,
    gain: Shared<VoiceGain>,
    start_frame: u64,
    offset_frame: usize,
    generation: u64,
}

impl ScheduledSource {
    pub fn new(
        buffer: SharedBuffer,
        gain: Shared<VoiceGain>,
        start_frame: u64,
        offset_frame: usize,
        generation: u64,
    ) -> Self {
        let offset_frame = offset_frame.min(buffer.frame_count());
        Self {
            buffer,
            gain,
            start_frame,
            offset_frame,
            generation,
        }
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Clock frame at which the source runs out of buffer
    #[inline]
    pub fn end_frame(&self) -> u64 {
        self.start_frame + (self.buffer.frame_count() - self.offset_frame) as u64
    }

    /// Add this source into `out`, whose first frame is clock frame `block_start`
    ///
    /// Returns true once the source has rendered its last frame.
    fn mix_into(&self, out: &mut [StereoSample], block_start: u64) -> bool {
        let block_end = block_start + out.len() as u64;
        if block_end <= self.start_frame {
            return false;
        }

        let frames = self.buffer.frames();
        let gain = self.gain.get();
        let first = self.start_frame.saturating_sub(block_start) as usize;

        for (i, sample) in out.iter_mut().enumerate().skip(first) {
            let read = self.offset_frame + (block_start + i as u64 - self.start_frame) as usize;
            match frames.get(read) {
                Some(&frame) => *sample += frame * gain,
                None => break,
            }
        }

        block_end >= self.end_frame()
    }
}

/// The single gain stage every stem voice feeds into
///
/// Owned by the output backend and only touched from the audio thread.
/// Source slots are pre-allocated, so rendering never allocates.
pub struct MixBus {
    slots: [Option<ScheduledSource>; MAX_VOICES],
    commands: rtrb::Consumer<BusCommand>,
    events: rtrb::Producer<SourceEnded>,
    clock: Arc<BusClock>,
    master_gain: Arc<VoiceGain>,
    /// Lowest generation still allowed to sound
    live_from: Arc<AtomicU64>,
}

impl MixBus {
    /// Drain pending commands and render one block into `output`
    ///
    /// `output.len()` frames are rendered and the clock advances by the same
    /// amount.
    pub fn process(&mut self, output: &mut StereoBuffer) {
        self.process_commands();
        self.render(output);
    }

    fn process_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                BusCommand::Start { slot, source } => {
                    if let Some(entry) = self.slots.get_mut(slot) {
                        *entry = Some(source);
                    }
                }
                BusCommand::Stop { slot } => {
                    if let Some(entry) = self.slots.get_mut(slot) {
                        *entry = None;
                    }
                }
            }
        }
    }

    fn render(&mut self, output: &mut StereoBuffer) {
        output.fill_silence();
        let block_start = self.clock.frames();
        let live_from = self.live_from.load(Ordering::Acquire);

        for slot in 0..MAX_VOICES {
            let finished = match &self.slots[slot] {
                Some(source) if source.generation() < live_from => None,
                Some(source) => Some(source.mix_into(output.as_mut_slice(), block_start)),
                None => continue,
            };

            let Some(finished) = finished else {
                // Retired without an end notification; the buffer goes to the GC
                self.slots[slot] = None;
                continue;
            };

            if finished {
                if let Some(source) = self.slots[slot].take() {
                    // Dropped notifications are tolerated: the transport
                    // drains this queue on every call it handles.
                    let _ = self.events.push(SourceEnded {
                        slot,
                        generation: source.generation(),
                    });
                }
            }
        }

        let master = self.master_gain.get();
        if master != 1.0 {
            output.scale(master);
        }

        self.clock.advance(output.len() as u64);
    }

    /// Number of slots currently holding a source
    pub fn active_sources(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn clock(&self) -> &Arc<BusClock> {
        &self.clock
    }
}

/// Transport-side endpoint of the mix bus
pub struct BusHandle {
    commands: rtrb::Producer<BusCommand>,
    events: rtrb::Consumer<SourceEnded>,
    clock: Arc<BusClock>,
    master_gain: Arc<VoiceGain>,
    live_from: Arc<AtomicU64>,
}

impl BusHandle {
    /// Queue a command for the audio thread (non-blocking)
    ///
    /// Returns the command back if the queue is full.
    pub fn send(&mut self, command: BusCommand) -> Result<(), BusCommand> {
        self.commands.push(command).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    /// Free space in the command queue
    pub fn free_slots(&self) -> usize {
        self.commands.slots()
    }

    /// Silence every source scheduled by a generation below `generation`
    ///
    /// Takes effect at the next rendered block, whether or not the matching
    /// stop commands made it into the queue. The fence only moves forward.
    pub fn retire_before(&self, generation: u64) {
        self.live_from.fetch_max(generation, Ordering::AcqRel);
    }

    /// Next end-of-buffer notification, if any
    pub fn poll_ended(&mut self) -> Option<SourceEnded> {
        self.events.pop().ok()
    }

    pub fn clock(&self) -> &BusClock {
        &self.clock
    }

    pub fn set_master_gain(&self, level: f32) {
        self.master_gain.set(level);
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain.get()
    }
}

/// Create a connected mix bus and handle pair for a device running at `sample_rate`
pub fn bus_channel(sample_rate: u32) -> (BusHandle, MixBus) {
    let (command_tx, command_rx) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
    let (event_tx, event_rx) = rtrb::RingBuffer::new(EVENT_QUEUE_CAPACITY);
    let clock = Arc::new(BusClock::new(sample_rate));
    let master_gain = Arc::new(VoiceGain::default());
    let live_from = Arc::new(AtomicU64::new(0));

    let handle = BusHandle {
        commands: command_tx,
        events: event_rx,
        clock: Arc::clone(&clock),
        master_gain: Arc::clone(&master_gain),
        live_from: Arc::clone(&live_from),
    };

    let bus = MixBus {
        slots: std::array::from_fn(|_| None),
        commands: command_rx,
        events: event_tx,
        clock,
        master_gain,
        live_from,
    };

    (handle, bus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc_handle;
    use crate::loader::DecodedBuffer;

    fn ramp(len: usize) -> SharedBuffer {
        let frames = (0..len).map(|i| StereoSample::mono(i as f32)).collect();
        DecodedBuffer::new(frames, 1000, 2).into_shared()
    }

    fn unity() -> Shared<VoiceGain> {
        Shared::new(&gc_handle(), VoiceGain::default())
    }

    fn render(bus: &mut MixBus, frames: usize) -> StereoBuffer {
        let mut out = StereoBuffer::silence(frames);
        bus.process(&mut out);
        out
    }

    #[test]
    fn test_clock_advances_with_rendering() {
        let (handle, mut bus) = bus_channel(1000);
        render(&mut bus, 250);
        assert_eq!(handle.clock().frames(), 250);
        assert!((handle.clock().now() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_source_starts_at_scheduled_frame() {
        let (mut handle, mut bus) = bus_channel(1000);
        let source = ScheduledSource::new(ramp(100), unity(), 4, 10, 1);
        assert!(handle.send(BusCommand::Start { slot: 0, source }).is_ok());

        let out = render(&mut bus, 8);
        assert_eq!(out[3], StereoSample::silence());
        assert_eq!(out[4], StereoSample::mono(10.0));
        assert_eq!(out[7], StereoSample::mono(13.0));
    }

    #[test]
    fn test_late_start_stays_aligned() {
        let (mut handle, mut bus) = bus_channel(1000);
        let early = ScheduledSource::new(ramp(100), unity(), 0, 0, 1);
        assert!(handle.send(BusCommand::Start { slot: 0, source: early }).is_ok());
        render(&mut bus, 16);

        // Armed 16 frames after its start frame: picks up at buffer frame 16
        let late = ScheduledSource::new(ramp(100), unity(), 0, 0, 1);
        assert!(handle.send(BusCommand::Start { slot: 1, source: late }).is_ok());
        let out = render(&mut bus, 4);
        assert_eq!(out[0], StereoSample::mono(32.0));
        assert_eq!(out[3], StereoSample::mono(38.0));
    }

    #[test]
    fn test_end_notification_carries_generation() {
        let (mut handle, mut bus) = bus_channel(1000);
        let source = ScheduledSource::new(ramp(10), unity(), 0, 4, 7);
        assert!(handle.send(BusCommand::Start { slot: 3, source }).is_ok());

        render(&mut bus, 4);
        assert_eq!(handle.poll_ended(), None);

        render(&mut bus, 4);
        assert_eq!(handle.poll_ended(), Some(SourceEnded { slot: 3, generation: 7 }));
        assert_eq!(bus.active_sources(), 0);
    }

    #[test]
    fn test_stop_and_gains() {
        let (mut handle, mut bus) = bus_channel(1000);
        let gain = unity();
        let source = ScheduledSource::new(ramp(100), Shared::clone(&gain), 0, 2, 1);
        assert!(handle.send(BusCommand::Start { slot: 0, source }).is_ok());

        gain.set(0.5);
        handle.set_master_gain(0.5);
        let out = render(&mut bus, 1);
        assert_eq!(out[0], StereoSample::mono(0.5));

        gain.set(0.0);
        let out = render(&mut bus, 1);
        assert_eq!(out[0], StereoSample::silence());

        assert!(handle.send(BusCommand::Stop { slot: 0 }).is_ok());
        render(&mut bus, 1);
        assert_eq!(bus.active_sources(), 0);
        assert_eq!(handle.poll_ended(), None);
    }

    #[test]
    fn test_retired_generation_is_dropped_without_stop() {
        let (mut handle, mut bus) = bus_channel(1000);
        let old = ScheduledSource::new(ramp(100), unity(), 0, 1, 1);
        let new = ScheduledSource::new(ramp(100), unity(), 0, 1, 2);
        assert!(handle.send(BusCommand::Start { slot: 0, source: old }).is_ok());
        assert!(handle.send(BusCommand::Start { slot: 1, source: new }).is_ok());
        render(&mut bus, 1);
        assert_eq!(bus.active_sources(), 2);

        handle.retire_before(2);
        let out = render(&mut bus, 1);
        assert_eq!(out[0], StereoSample::mono(2.0));
        assert_eq!(bus.active_sources(), 1);
        assert_eq!(handle.poll_ended(), None);

        // Lowering the fence cannot revive anything
        handle.retire_before(1);
        handle.retire_before(3);
        let out = render(&mut bus, 1);
        assert_eq!(out[0], StereoSample::silence());
        assert_eq!(bus.active_sources(), 0);
    }
}
