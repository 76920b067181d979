//! Transport timing record

/// Playback phase of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Offset fixed, nothing scheduled
    #[default]
    Stopped,
    /// Every voice has a scheduled source and the clock is running
    Playing,
    /// Offset holds the position captured at pause time, nothing scheduled
    Paused,
}

/// The engine's single mutable timing record
///
/// While playing, the position is `offset + max(0, now - origin)`: during the
/// lookahead window between scheduling and the shared start time the
/// position holds at the requested offset instead of reading earlier.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransportState {
    phase: Phase,
    origin_time: f64,
    offset_seconds: f64,
}

impl TransportState {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.phase == Phase::Playing
    }

    /// Clock time at which the current playback was scheduled to start
    #[inline]
    pub fn origin_time(&self) -> f64 {
        self.origin_time
    }

    #[inline]
    pub fn offset_seconds(&self) -> f64 {
        self.offset_seconds
    }

    /// Position in seconds for clock time `now`, never past `duration`
    pub fn position(&self, now: f64, duration: f64) -> f64 {
        match self.phase {
            Phase::Playing => {
                let elapsed = (now - self.origin_time).max(0.0);
                (self.offset_seconds + elapsed).min(duration)
            }
            Phase::Stopped | Phase::Paused => self.offset_seconds,
        }
    }

    pub(crate) fn start(&mut self, origin_time: f64, offset_seconds: f64) {
        self.phase = Phase::Playing;
        self.origin_time = origin_time;
        self.offset_seconds = offset_seconds;
    }

    pub(crate) fn pause_at(&mut self, position: f64) {
        self.phase = Phase::Paused;
        self.offset_seconds = position;
    }

    /// Stopped with the offset rewound to the start
    pub(crate) fn stop(&mut self) {
        self.phase = Phase::Stopped;
        self.offset_seconds = 0.0;
    }

    /// Stopped with the offset left where it is (failed play)
    pub(crate) fn halt(&mut self) {
        self.phase = Phase::Stopped;
    }

    pub(crate) fn set_offset(&mut self, offset_seconds: f64) {
        self.offset_seconds = offset_seconds;
    }
}

/// Clamp a requested position into `[0, duration]`
///
/// Non-finite requests (NaN) map to the start of the piece.
pub fn clamp_offset(seconds: f64, duration: f64) -> f64 {
    if seconds.is_nan() {
        return 0.0;
    }
    seconds.clamp(0.0, duration.max(0.0))
}
