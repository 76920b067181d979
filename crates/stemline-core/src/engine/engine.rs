//! The stem engine: transport state machine over voices and the mix bus
//!
//! # Scheduling model
//!
//! Sources are never repositioned while running. Every transition
//! (play, pause, seek, stop) ends all scheduled sources and, when playback
//! continues, schedules a fresh set against one shared start frame
//! `now + lookahead` with one shared offset. Every source of one `play`
//! call therefore reads the same buffer position at the same clock frame.
//!
//! # End of track
//!
//! Sources report reaching the end of their buffer through the bus event
//! queue. The engine drains the queue at the top of every call, so a host
//! that polls `current_position()` / `is_playing()` also drives natural
//! end-of-track detection.
//!
//! That is why the polling queries take `&mut self`: draining an event can
//! end playback, which sends stop commands and rewinds the transport. Both
//! queue ends are single-owner, so the engine stays with one owner instead
//! of sharing them behind locks. A UI that reads state from elsewhere owns
//! the engine on one thread and publishes the polled values.

use basedrop::Shared;

use super::bus::BusHandle;
use super::transport::{clamp_offset, Phase, TransportState};
use super::voice::StemVoice;
use crate::audio::{
    start_output, AudioResult, OutputHandle, OutputSystem, PlaybackError, PlaybackResult,
};
use crate::config::EngineConfig;
use crate::loader::{
    load_stems, BufferStore, FileFetcher, LoadResult, ProgressFn, SharedBuffer, StemFetcher,
};
use crate::types::StemName;

/// Multi-stem synchronized player
///
/// Owns its output device, mix bus and clock; several engines can coexist.
/// Methods take `&mut self`: the engine expects a single caller thread.
pub struct StemEngine {
    output: OutputHandle,
    bus: BusHandle,
    sample_rate: u32,
    latency_ms: f32,
    store: BufferStore,
    voices: Vec<StemVoice>,
    transport: TransportState,
    /// Incremented on every play and load; tags scheduled sources
    generation: u64,
    config: EngineConfig,
    fetcher: Box<dyn StemFetcher>,
    disposed: bool,
}

impl StemEngine {
    /// Create an engine on a started output backend
    pub fn new(output: OutputSystem, fetcher: impl StemFetcher + 'static, config: EngineConfig) -> Self {
        log::info!(
            "Stem engine ready: {}Hz, {} frame buffer, {:.0}ms lookahead",
            output.sample_rate,
            output.buffer_size,
            config.lookahead_ms
        );

        Self {
            output: output.handle,
            bus: output.bus,
            sample_rate: output.sample_rate,
            latency_ms: output.latency_ms,
            store: BufferStore::new(),
            voices: Vec::new(),
            transport: TransportState::new(),
            generation: 0,
            config,
            fetcher: Box::new(fetcher),
            disposed: false,
        }
    }

    /// Open the configured output device and read stems from the filesystem
    pub fn open_default(config: EngineConfig) -> AudioResult<Self> {
        let output = start_output(&config.output)?;
        Ok(Self::new(output, FileFetcher::new(), config))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────

    /// Load a new set of stems, replacing the current one
    ///
    /// All stems are fetched and decoded in parallel. If any of them fails
    /// nothing changes: the previous stems, position and playback stay as
    /// they were. On success any running playback is stopped and the new
    /// set is installed stopped at position 0.
    pub fn load<I, N, L>(&mut self, stems: I) -> LoadResult<()>
    where
        I: IntoIterator<Item = (N, L)>,
        N: Into<StemName>,
        L: Into<String>,
    {
        self.load_inner(collect_request(stems), None)
    }

    /// [`load`](Self::load) with a progress callback
    ///
    /// `on_progress` receives the completed fraction once per finished
    /// stem, strictly increasing and ending at exactly 1.0. It is called
    /// from loader threads, one call at a time.
    pub fn load_with_progress<I, N, L, F>(&mut self, stems: I, on_progress: F) -> LoadResult<()>
    where
        I: IntoIterator<Item = (N, L)>,
        N: Into<StemName>,
        L: Into<String>,
        F: Fn(f32) + Send + Sync,
    {
        let progress: ProgressFn<'_> = &on_progress;
        self.load_inner(collect_request(stems), Some(progress))
    }

    fn load_inner(
        &mut self,
        request: Vec<(StemName, String)>,
        on_progress: Option<ProgressFn<'_>>,
    ) -> LoadResult<()> {
        log::info!("Loading {} stems", request.len());

        let loaded = load_stems(
            &request,
            self.fetcher.as_ref(),
            self.sample_rate,
            self.config.load_workers,
            on_progress,
        )?;

        self.poll_events();
        if self.transport.phase() != Phase::Stopped {
            log::info!("Stopping current playback for new stems");
        }
        self.halt_voices();
        self.warn_divergent_durations(&loaded);

        self.voices = loaded
            .iter()
            .enumerate()
            .map(|(slot, (name, buffer))| StemVoice::new(name.clone(), Shared::clone(buffer), slot))
            .collect();
        self.store.replace(loaded);
        self.transport.stop();
        self.generation += 1;

        log::info!(
            "Loaded stems [{}], duration {:.2}s",
            self.voices
                .iter()
                .map(|v| v.name().as_str())
                .collect::<Vec<_>>()
                .join(", "),
            self.store.duration_seconds()
        );

        Ok(())
    }

    fn warn_divergent_durations(&self, loaded: &[(StemName, SharedBuffer)]) {
        let Some((first_name, first)) = loaded.first() else {
            return;
        };
        let tolerance = self.config.end_tolerance_seconds();
        for (name, buffer) in &loaded[1..] {
            let diff = buffer.duration_seconds() - first.duration_seconds();
            if diff.abs() > tolerance {
                log::warn!(
                    "Stem '{}' is {:.3}s {} than '{}', which defines the duration",
                    name,
                    diff.abs(),
                    if diff > 0.0 { "longer" } else { "shorter" },
                    first_name
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    /// Start playback of every stem, from `from` seconds or the current offset
    ///
    /// Activates the output device first. On failure the engine is left
    /// stopped with its offset unchanged and no stem sounding. With nothing
    /// loaded this does nothing.
    pub fn play(&mut self, from: Option<f64>) -> PlaybackResult<()> {
        self.poll_events();

        if self.voices.is_empty() {
            log::debug!("Play ignored: no stems loaded");
            return Ok(());
        }

        if let Err(e) = self.output.activate() {
            return Err(self.fail_play(e));
        }

        // Every active source needs a stop, every voice a start
        let active = self.voices.iter().filter(|v| v.active_source().is_some()).count();
        if self.bus.free_slots() < active + self.voices.len() {
            return Err(self.fail_play(PlaybackError::CommandQueueFull));
        }

        let offset = match from {
            Some(t) => clamp_offset(t, self.duration()),
            None => self.transport.offset_seconds(),
        };
        self.transport.set_offset(offset);
        self.halt_voices();

        let clock = self.bus.clock();
        let start_frame = clock.frames() + clock.seconds_to_frames(self.config.lookahead_seconds());
        let origin_time = clock.frames_to_seconds(start_frame);

        self.generation += 1;
        let generation = self.generation;
        let bus = &mut self.bus;
        let scheduled = self
            .voices
            .iter_mut()
            .try_for_each(|voice| voice.begin_playback(bus, start_frame, offset, generation));
        if let Err(e) = scheduled {
            return Err(self.fail_play(e));
        }

        self.transport.start(origin_time, offset);
        log::debug!(
            "Playing {} stems from {:.3}s at frame {} (generation {})",
            self.voices.len(),
            offset,
            start_frame,
            self.generation
        );

        Ok(())
    }

    fn fail_play(&mut self, error: PlaybackError) -> PlaybackError {
        self.halt_voices();
        self.transport.halt();
        log::error!("Playback failed: {}", error);
        error
    }

    /// Freeze playback at the current position
    ///
    /// No-op unless playing.
    pub fn pause(&mut self) {
        self.poll_events();
        if !self.transport.is_playing() {
            return;
        }

        let position = self.position_now();
        if let Err(e) = self.output.suspend() {
            log::warn!("Could not suspend output: {}", e);
        }
        self.halt_voices();
        self.transport.pause_at(position);
        log::debug!("Paused at {:.3}s", position);
    }

    /// Continue from the paused (or stopped) offset
    ///
    /// Reschedules every stem rather than unfreezing the clock, so stems are
    /// realigned on resume. No-op while playing.
    pub fn resume(&mut self) -> PlaybackResult<()> {
        self.poll_events();
        if self.transport.is_playing() {
            return Ok(());
        }
        self.play(None)
    }

    /// Stop every stem and rewind to 0
    pub fn stop(&mut self) {
        self.halt_voices();
        self.transport.stop();
        log::debug!("Stopped");
    }

    /// Move to `to` seconds (clamped to the piece)
    ///
    /// While playing, playback is rescheduled at the new position and keeps
    /// playing; otherwise only the offset changes.
    pub fn seek(&mut self, to: f64) -> PlaybackResult<()> {
        self.poll_events();
        let target = clamp_offset(to, self.duration());

        if self.transport.is_playing() {
            self.play(Some(target))
        } else {
            self.transport.set_offset(target);
            Ok(())
        }
    }

    /// Mute or unmute one stem without touching the schedule
    ///
    /// Unknown stems are ignored.
    pub fn set_muted(&mut self, stem: impl AsRef<str>, muted: bool) {
        let stem = stem.as_ref();
        match self.voices.iter().find(|v| v.name().as_str() == stem) {
            Some(voice) => voice.set_muted(muted),
            None => log::debug!("set_muted: no stem named '{}'", stem),
        }
    }

    /// Whether a stem is muted (`None` for unknown stems)
    pub fn is_muted(&self, stem: impl AsRef<str>) -> Option<bool> {
        let stem = stem.as_ref();
        self.voices
            .iter()
            .find(|v| v.name().as_str() == stem)
            .map(StemVoice::is_muted)
    }

    /// Set the level of the mix bus (all stems), clamped to `[0, 2]`
    pub fn set_master_gain(&mut self, level: f32) {
        let level = if level.is_finite() { level.clamp(0.0, 2.0) } else { 1.0 };
        self.bus.set_master_gain(level);
    }

    pub fn master_gain(&self) -> f32 {
        self.bus.master_gain()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Duration of the first stem of the current set, 0 when nothing is loaded
    pub fn duration(&self) -> f64 {
        self.store.duration_seconds()
    }

    /// Current position in seconds
    ///
    /// Handles pending end-of-buffer events first, so reaching the end of the
    /// piece is observed here as Stopped at 0.
    pub fn current_position(&mut self) -> f64 {
        self.poll_events();
        self.position_now()
    }

    /// Whether playback is running; handles pending end events first
    pub fn is_playing(&mut self) -> bool {
        self.poll_events();
        self.transport.is_playing()
    }

    pub fn phase(&mut self) -> Phase {
        self.poll_events();
        self.transport.phase()
    }

    /// Normalized waveform overview of one stem (see
    /// [`DecodedBuffer::waveform_peaks`](crate::loader::DecodedBuffer::waveform_peaks));
    /// `None` for unknown stems
    pub fn waveform_peaks(&self, stem: impl AsRef<str>, count: usize) -> Option<Vec<f32>> {
        self.store
            .get(stem.as_ref())
            .map(|buffer| buffer.waveform_peaks(count))
    }

    /// Names of the loaded stems in load order
    pub fn stem_names(&self) -> Vec<&StemName> {
        self.voices.iter().map(StemVoice::name).collect()
    }

    /// Sample rate of the output device (and of every loaded buffer)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Output latency of the device in milliseconds
    pub fn latency_ms(&self) -> f32 {
        self.latency_ms
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Tear down playback, release every buffer and close the output device
    ///
    /// Dropping the engine does the same.
    pub fn dispose(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.halt_voices();
        self.voices.clear();
        self.store.clear();
        self.transport.stop();
        self.output.close();
        log::info!("Stem engine disposed");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn position_now(&self) -> f64 {
        self.transport.position(self.bus.clock().now(), self.duration())
    }

    /// End every voice's source
    ///
    /// The fence silences the current generation even if some of the stop
    /// commands do not fit in the queue.
    fn halt_voices(&mut self) {
        self.bus.retire_before(self.generation + 1);
        for voice in self.voices.iter_mut() {
            voice.end_playback(&mut self.bus);
        }
    }

    /// Drain end-of-buffer notifications through the single end handler
    fn poll_events(&mut self) {
        let mut current_ended = false;

        while let Some(event) = self.bus.poll_ended() {
            if let Some(voice) = self.voices.iter_mut().find(|v| v.slot() == event.slot) {
                voice.source_ended(event.generation);
            }
            current_ended |= event.generation == self.generation;
        }

        if !current_ended || !self.transport.is_playing() {
            return;
        }

        // Shorter stems may run out before the piece does
        let position = self.position_now();
        if position + self.config.end_tolerance_seconds() >= self.duration() {
            log::info!("Reached end of stems at {:.3}s", position);
            self.stop();
        }
    }
}

impl Drop for StemEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn collect_request<I, N, L>(stems: I) -> Vec<(StemName, String)>
where
    I: IntoIterator<Item = (N, L)>,
    N: Into<StemName>,
    L: Into<String>,
{
    stems
        .into_iter()
        .map(|(name, locator)| (name.into(), locator.into()))
        .collect()
}
