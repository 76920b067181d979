//! Stem names and stereo frame types shared by the loader and the mix bus

use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

/// Upper bound on stems per load
///
/// The mix bus reserves one source slot per voice up front so scheduling a
/// source never allocates on the audio thread.
pub const MAX_VOICES: usize = 16;

pub type Sample = f32;

/// Name of a stem within a loaded piece
///
/// Callers decide which names exist, so this is an open string rather than
/// an enum. [`StemKind`] covers the usual band split.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StemName(String);

impl StemName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StemName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for StemName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<StemKind> for StemName {
    fn from(kind: StemKind) -> Self {
        Self(kind.name().to_string())
    }
}

impl AsRef<str> for StemName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Drums, bass, guitar and vocal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemKind {
    Drums,
    Bass,
    Guitar,
    Vocal,
}

impl StemKind {
    pub fn name(&self) -> &'static str {
        match self {
            StemKind::Drums => "drums",
            StemKind::Bass => "bass",
            StemKind::Guitar => "guitar",
            StemKind::Vocal => "vocal",
        }
    }
}

/// One stereo frame
///
/// `#[repr(C)]` fixes the layout to `[left, right]`, so a slice of frames
/// casts to interleaved `f32` with bytemuck. The stereo cpal callback writes
/// the device buffer that way.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value on both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, gain: Sample) -> Self {
        Self::new(self.left * gain, self.right * gain)
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, gain: Sample) {
        self.left *= gain;
        self.right *= gain;
    }
}

/// Block of stereo frames rendered by the mix bus
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    frames: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Empty buffer with room for `capacity` frames
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
        }
    }

    pub fn silence(len: usize) -> Self {
        Self {
            frames: vec![StereoSample::silence(); len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Resize within the existing allocation; new frames are silent
    ///
    /// Real-time safe as long as `len` stays within the capacity.
    #[inline]
    pub fn set_len_from_capacity(&mut self, len: usize) {
        debug_assert!(len <= self.frames.capacity(), "block length beyond capacity");
        self.frames.resize(len, StereoSample::silence());
    }

    pub fn fill_silence(&mut self) {
        self.frames.fill(StereoSample::silence());
    }

    /// Append the frames of `other`
    pub fn extend_from(&mut self, other: &StereoBuffer) {
        self.frames.extend_from_slice(&other.frames);
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.frames
    }

    /// The frames as interleaved `[L, R, L, R, ...]`, without copying
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.frames)
    }

    pub fn scale(&mut self, gain: Sample) {
        for frame in &mut self.frames {
            *frame *= gain;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.frames.iter()
    }

    /// Largest absolute sample on either channel
    pub fn peak(&self) -> Sample {
        self.frames.iter().map(StereoSample::peak).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &StereoSample {
        &self.frames[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_applies_to_both_channels() {
        let mut frame = StereoSample::new(1.0, -2.0);
        frame += StereoSample::mono(0.5);
        assert_eq!(frame * 0.5, StereoSample::new(0.75, -0.75));
        assert_eq!(frame.peak(), 1.5);
    }

    #[test]
    fn test_interleaved_view_orders_left_first() {
        let mut buffer = StereoBuffer::with_capacity(4);
        buffer.extend_from(&StereoBuffer::silence(1));
        buffer.set_len_from_capacity(2);
        buffer.as_mut_slice()[1] = StereoSample::new(3.0, 4.0);
        assert_eq!(buffer.as_interleaved(), &[0.0, 0.0, 3.0, 4.0]);
    }

    #[test]
    fn test_set_len_from_capacity_fills_silence() {
        let mut buffer = StereoBuffer::silence(8);
        buffer.scale(2.0);
        buffer.set_len_from_capacity(2);
        assert_eq!(buffer.len(), 2);
        buffer.set_len_from_capacity(6);
        assert_eq!(buffer.peak(), 0.0);
    }

    #[test]
    fn test_stem_kind_converts_to_name() {
        assert_eq!(StemKind::Vocal.name(), "vocal");
        assert_eq!(StemName::from(StemKind::Bass).as_str(), "bass");
    }
}
