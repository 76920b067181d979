//! Audio backend error types

use thiserror::Error;

/// Errors that can occur while opening an output backend
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio output devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start the audio stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Failed to pause the audio stream
    #[error("Failed to pause audio stream: {0}")]
    StreamPauseError(String),

    /// The crate was built without any real-time output backend
    #[error("No output backend compiled in (enable the `cpal-backend` feature)")]
    BackendUnavailable,
}

/// Result type for backend operations
pub type AudioResult<T> = Result<T, AudioError>;

/// Errors surfaced by `play`, `resume` and `seek`
///
/// Whenever one of these is returned the transport is left stopped with its
/// offset unchanged and no stem sounding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// The output device is missing or has already been closed
    #[error("Audio output device is unavailable")]
    DeviceUnavailable,

    /// The output device refused to start (permission, busy device, ...)
    #[error("Failed to activate audio output: {0}")]
    DeviceActivationFailed(String),

    /// The audio thread is not draining scheduling commands
    #[error("Audio command queue is full")]
    CommandQueueFull,
}

/// Result type for transport operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;
