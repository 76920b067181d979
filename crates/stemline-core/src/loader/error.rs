//! Stem loading error types

use thiserror::Error;

use crate::types::StemName;

/// Errors that can occur while loading a set of stems
///
/// Any of these aborts the whole load and leaves the engine untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The resource for a stem could not be retrieved
    #[error("Failed to fetch stem '{stem}': {reason}")]
    FetchFailed { stem: StemName, reason: String },

    /// The resource for a stem is not decodable audio
    #[error("Failed to decode stem '{stem}': {reason}")]
    DecodeFailed { stem: StemName, reason: String },

    /// The load request was empty
    #[error("No stems to load")]
    NoStems,

    /// The same stem name was requested twice
    #[error("Stem '{0}' requested more than once")]
    DuplicateStem(StemName),

    /// More stems than the mix bus has voices for
    #[error("Too many stems: {count} requested, at most {max} supported")]
    TooManyStems { count: usize, max: usize },

    /// The decode worker pool could not be created
    #[error("Failed to start stem loader threads: {0}")]
    WorkerPool(String),
}

/// Errors raised while turning fetched bytes into a decoded buffer
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Format not recognised or codec not supported
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Container has no decodable audio track
    #[error("No audio track found")]
    NoAudioTrack,

    /// Track does not declare a sample rate
    #[error("Unknown sample rate")]
    UnknownSampleRate,

    /// Every packet failed or the stream was empty
    #[error("Stream contains no audio frames")]
    Empty,

    /// Sample rate conversion failed
    #[error("Resampling from {from}Hz to {to}Hz failed: {reason}")]
    Resample { from: u32, to: u32, reason: String },
}

/// Result type for loading operations
pub type LoadResult<T> = Result<T, LoadError>;
