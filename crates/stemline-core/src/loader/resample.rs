//! Sample rate conversion for decoded stems
//!
//! Stems whose file rate differs from the output device rate are converted
//! once at load time, so the mix bus only ever reads frames 1:1.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::buffer::DecodedBuffer;
use super::error::DecodeError;
use crate::types::StereoSample;

/// Input frames per resampler call
const CHUNK_SIZE: usize = 1024;

fn interpolation_params() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Convert `buffer` to `target_rate`
///
/// Returns the buffer unchanged when the rates already match. The output
/// is trimmed of the resampler's delay so frame 0 of the result lines up
/// with frame 0 of the input.
pub fn resample_to(buffer: DecodedBuffer, target_rate: u32) -> Result<DecodedBuffer, DecodeError> {
    let source_rate = buffer.sample_rate();
    if source_rate == target_rate || buffer.frame_count() == 0 {
        return Ok(buffer);
    }

    let fail = |reason: String| DecodeError::Resample {
        from: source_rate,
        to: target_rate,
        reason,
    };

    let ratio = target_rate as f64 / source_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, interpolation_params(), CHUNK_SIZE, 2)
        .map_err(|e| fail(e.to_string()))?;

    let left: Vec<f32> = buffer.frames().iter().map(|s| s.left).collect();
    let right: Vec<f32> = buffer.frames().iter().map(|s| s.right).collect();
    let input_len = left.len();

    let expected = (input_len as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let wanted = expected + delay;

    let mut out_left: Vec<f32> = Vec::with_capacity(wanted + CHUNK_SIZE);
    let mut out_right: Vec<f32> = Vec::with_capacity(wanted + CHUNK_SIZE);

    let mut pos = 0;
    while pos + resampler.input_frames_next() <= input_len {
        let end = pos + resampler.input_frames_next();
        let chunk: [&[f32]; 2] = [&left[pos..end], &right[pos..end]];
        let out = resampler
            .process(&chunk[..], None)
            .map_err(|e| fail(e.to_string()))?;
        out_left.extend_from_slice(&out[0]);
        out_right.extend_from_slice(&out[1]);
        pos = end;
    }

    if pos < input_len {
        let tail: [&[f32]; 2] = [&left[pos..], &right[pos..]];
        let out = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| fail(e.to_string()))?;
        out_left.extend_from_slice(&out[0]);
        out_right.extend_from_slice(&out[1]);
    }

    // Flush the filter tail
    while out_left.len() < wanted {
        let out = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| fail(e.to_string()))?;
        if out[0].is_empty() {
            break;
        }
        out_left.extend_from_slice(&out[0]);
        out_right.extend_from_slice(&out[1]);
    }

    let end = wanted.min(out_left.len());
    let start = delay.min(end);
    let frames: Vec<StereoSample> = out_left[start..end]
        .iter()
        .zip(&out_right[start..end])
        .map(|(&l, &r)| StereoSample::new(l, r))
        .collect();

    log::debug!(
        "Resampled {} frames at {}Hz to {} frames at {}Hz",
        input_len,
        source_rate,
        frames.len(),
        target_rate
    );

    Ok(DecodedBuffer::new(frames, target_rate, buffer.channels()))
}
