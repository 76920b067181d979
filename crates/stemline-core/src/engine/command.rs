//! Lock-free command queue between the transport and the audio thread
//!
//! The transport never touches the mix bus directly. It pushes
//! [`BusCommand`]s into an `rtrb` ringbuffer and the audio thread drains the
//! queue at the start of every rendered block, so no command ever lands in
//! the middle of a block. End-of-buffer notifications travel back the same
//! way in a second queue.
//!
//! # Real-Time Safety
//!
//! - **No allocations**: both ringbuffers are allocated when the output starts
//! - **Wait-free**: push and pop are O(1) and never block
//! - **Single-producer single-consumer**: transport → audio, audio → transport

use super::bus::ScheduledSource;

/// Capacity of the transport → audio command queue
///
/// A full play cycle needs at most two commands per voice (end + begin).
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Capacity of the audio → transport notification queue
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Commands sent from the transport to the audio thread
pub enum BusCommand {
    /// Arm a source in a voice slot, replacing whatever the slot held
    Start { slot: usize, source: ScheduledSource },
    /// Stop and release the source in a voice slot (no-op if empty)
    Stop { slot: usize },
}

/// Notification that a scheduled source read past the end of its buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceEnded {
    /// Voice slot the source was playing in
    pub slot: usize,
    /// Play generation the source was scheduled by
    pub generation: u64,
}
