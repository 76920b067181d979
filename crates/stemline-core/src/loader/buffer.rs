//! Decoded stem buffers and the store that owns them

use basedrop::Shared;

use crate::engine::gc_handle;
use crate::types::{StemName, StereoSample};

/// A fully decoded stem, ready for playback
///
/// Immutable once created. Frames are always stereo: mono sources are
/// duplicated to both channels and only the first two channels of wider
/// sources are kept. `channels` records the layout of the source file.
#[derive(Debug, Clone)]
pub struct DecodedBuffer {
    frames: Vec<StereoSample>,
    sample_rate: u32,
    channels: u16,
}

/// Reference-counted buffer whose deallocation is deferred to the GC thread
pub type SharedBuffer = Shared<DecodedBuffer>;

impl DecodedBuffer {
    pub fn new(frames: Vec<StereoSample>, sample_rate: u32, channels: u16) -> Self {
        debug_assert!(sample_rate > 0, "sample rate must be positive");
        Self {
            frames,
            sample_rate,
            channels,
        }
    }

    /// Build a buffer from interleaved samples with any channel count
    pub fn from_interleaved(samples: &[f32], sample_rate: u32, channels: u16) -> Self {
        let frames = match channels {
            0 => Vec::new(),
            1 => samples.iter().map(|&s| StereoSample::mono(s)).collect(),
            n => samples
                .chunks_exact(n as usize)
                .map(|frame| StereoSample::new(frame[0], frame[1]))
                .collect(),
        };
        Self::new(frames, sample_rate, channels)
    }

    #[inline]
    pub fn frames(&self) -> &[StereoSample] {
        &self.frames
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the source this buffer was decoded from
    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames.len() as f64 / self.sample_rate as f64
    }

    /// Convert a position in seconds to a frame index (clamped to the buffer)
    pub fn frame_at(&self, seconds: f64) -> usize {
        let frame = (seconds.max(0.0) * self.sample_rate as f64).round() as usize;
        frame.min(self.frames.len())
    }

    /// Overview of the left channel in `count` equal blocks
    ///
    /// Each value is the mean absolute sample of its block, normalized so the
    /// loudest block reads 1.0. Blocks past the end of a short buffer are 0.
    pub fn waveform_peaks(&self, count: usize) -> Vec<f32> {
        if count == 0 {
            return Vec::new();
        }

        let len = self.frames.len();
        let block = (len / count).max(1);
        let mut peaks: Vec<f32> = (0..count)
            .map(|i| {
                let start = (i * block).min(len);
                let end = (start + block).min(len);
                if start == end {
                    return 0.0;
                }
                let sum: f32 = self.frames[start..end].iter().map(|f| f.left.abs()).sum();
                sum / (end - start) as f32
            })
            .collect();

        let max = peaks.iter().copied().fold(0.0, f32::max);
        if max > 0.0 {
            for peak in &mut peaks {
                *peak /= max;
            }
        }
        peaks
    }

    /// Move the buffer into a GC-managed shared allocation
    pub fn into_shared(self) -> SharedBuffer {
        Shared::new(&gc_handle(), self)
    }
}

/// Owns the decoded buffer of every stem of the current load
///
/// Entries keep the order the stems were requested in; the first entry
/// defines the piece's duration.
#[derive(Default)]
pub struct BufferStore {
    entries: Vec<(StemName, SharedBuffer)>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every buffer with the result of a new load
    pub fn replace(&mut self, entries: Vec<(StemName, SharedBuffer)>) {
        self.entries = entries;
    }

    /// Release every buffer
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, stem: &str) -> Option<&SharedBuffer> {
        self.entries
            .iter()
            .find(|(name, _)| name.as_str() == stem)
            .map(|(_, buffer)| buffer)
    }

    /// Duration of the first stem, or 0 when nothing is loaded
    pub fn duration_seconds(&self) -> f64 {
        self.entries
            .first()
            .map(|(_, buffer)| buffer.duration_seconds())
            .unwrap_or(0.0)
    }
}
