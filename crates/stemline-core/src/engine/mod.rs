//! Playback engine - transport, stem voices, mix bus
//!
//! This module contains the scheduling core:
//! - MixBus: audio-thread renderer that owns the scheduled sources and the clock
//! - StemVoice: one stem's buffer, gain and current source
//! - TransportState: the playing/paused/stopped timing record
//! - StemEngine: the public engine tying everything together

mod bus;
mod command;
mod engine;
mod gc;
mod transport;
mod voice;

pub use bus::{bus_channel, BusClock, BusHandle, MixBus, ScheduledSource, VoiceGain};
pub use command::{BusCommand, SourceEnded, COMMAND_QUEUE_CAPACITY, EVENT_QUEUE_CAPACITY};
pub use engine::StemEngine;
pub use gc::gc_handle;
pub use transport::{clamp_offset, Phase, TransportState};
pub use voice::{SourceHandle, StemVoice};
