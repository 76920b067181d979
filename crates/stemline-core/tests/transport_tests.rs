//! End-to-end transport behaviour through the offline backend
//!
//! Every test runs the real loader (WAV bytes decoded by symphonia), the
//! real mix bus and the transport, with time advanced by hand.

use std::collections::HashMap;
use std::io::{self, Cursor};

use stemline_core::audio::{start_offline, OfflineDriver};
use stemline_core::{EngineConfig, LoadError, Phase, PlaybackError, StemEngine, StereoBuffer};

const RATE: u32 = 8000;

/// Ramp used to check alignment: stems playing `x` and `-x` cancel out
fn ramp(i: usize) -> i16 {
    ((i % 200) as i16 + 1) * 100
}

fn wav(seconds: f64, sample: impl Fn(usize) -> i16) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..(seconds * RATE as f64) as usize {
            let value = sample(i);
            writer.write_sample(value).unwrap();
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// In-memory resources:
/// - `drums.wav`, `bass.wav`: 10 s, `bass` is the inverse of `drums`
/// - `long.wav`: 12 s, `short.wav`: 4 s
/// - `noise.wav`: not audio, `missing.wav`: fetch error
fn library() -> HashMap<String, Vec<u8>> {
    let mut files = HashMap::new();
    files.insert("drums.wav".to_string(), wav(10.0, ramp));
    files.insert("bass.wav".to_string(), wav(10.0, |i| -ramp(i)));
    files.insert("long.wav".to_string(), wav(12.0, ramp));
    files.insert("short.wav".to_string(), wav(4.0, ramp));
    files.insert("noise.wav".to_string(), b"not a wav file at all".to_vec());
    files
}

fn rig(config: EngineConfig) -> (StemEngine, OfflineDriver) {
    let files = library();
    let fetcher = move |locator: &str| -> io::Result<Vec<u8>> {
        files
            .get(locator)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, locator.to_string()))
    };

    let (output, driver) = start_offline(RATE);
    (StemEngine::new(output, fetcher, config), driver)
}

/// Engine whose play starts on the very next rendered frame
fn exact_rig() -> (StemEngine, OfflineDriver) {
    rig(EngineConfig::default().with_lookahead_ms(0.0))
}

fn load_pair(engine: &mut StemEngine) {
    engine
        .load([("drums", "drums.wav"), ("bass", "bass.wav")])
        .unwrap();
}

fn assert_near(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() <= epsilon,
        "expected {} ± {}, got {}",
        expected,
        epsilon,
        actual
    );
}

fn is_silent(buffer: &StereoBuffer) -> bool {
    buffer.peak() < 1e-6
}

#[test]
fn load_reports_first_stem_duration() {
    let (mut engine, _driver) = exact_rig();
    engine
        .load([("drums", "drums.wav"), ("long", "long.wav")])
        .unwrap();

    assert_near(engine.duration(), 10.0, 1e-9);
    assert!(!engine.is_playing());
    assert_eq!(engine.current_position(), 0.0);
}

#[test]
fn seek_while_stopped_is_exact() {
    let (mut engine, _driver) = exact_rig();
    load_pair(&mut engine);

    for t in [0.0, 0.001, 2.5, 7.125, 9.999, 10.0] {
        engine.seek(t).unwrap();
        assert_eq!(engine.current_position(), t);
        assert_eq!(engine.phase(), Phase::Stopped);
    }

    engine.seek(-3.0).unwrap();
    assert_eq!(engine.current_position(), 0.0);
    engine.seek(42.0).unwrap();
    assert_eq!(engine.current_position(), 10.0);
}

#[test]
fn playing_to_the_end_stops_and_rewinds() {
    let (mut engine, driver) = exact_rig();
    load_pair(&mut engine);

    engine.play(Some(0.0)).unwrap();
    driver.advance(9.5);
    assert!(engine.is_playing());
    assert_near(engine.current_position(), 9.5, 1e-9);

    driver.advance(0.5);
    assert!(!engine.is_playing());
    assert_eq!(engine.phase(), Phase::Stopped);
    assert_eq!(engine.current_position(), 0.0);
}

#[test]
fn play_seek_and_natural_end_scenario() {
    let (mut engine, driver) = exact_rig();
    load_pair(&mut engine);

    engine.play(None).unwrap();
    driver.advance(3.0);
    assert_near(engine.current_position(), 3.0, 0.001);

    engine.seek(7.0).unwrap();
    assert_near(engine.current_position(), 7.0, 0.001);
    assert!(engine.is_playing());

    driver.advance(3.0);
    assert_eq!(engine.phase(), Phase::Stopped);
    assert_eq!(engine.current_position(), 0.0);
}

#[test]
fn pause_then_resume_keeps_position() {
    let (mut engine, driver) = rig(EngineConfig::default());
    load_pair(&mut engine);

    engine.play(None).unwrap();
    driver.advance(2.0);
    engine.pause();
    let paused_at = engine.current_position();
    assert_near(paused_at, 1.95, 0.001);
    assert_eq!(engine.phase(), Phase::Paused);

    // The device is suspended: no audio, no clock
    assert!(driver.is_suspended());
    assert!(is_silent(&driver.advance(1.0)));
    assert_eq!(engine.current_position(), paused_at);

    engine.resume().unwrap();
    assert!(engine.is_playing());
    assert_near(engine.current_position(), paused_at, 0.02);

    driver.advance(1.0);
    assert_near(engine.current_position(), paused_at + 0.95, 0.001);
}

#[test]
fn pause_twice_equals_pause_once() {
    let (mut engine, driver) = exact_rig();
    load_pair(&mut engine);

    engine.play(None).unwrap();
    driver.advance(1.25);
    engine.pause();
    let once = engine.current_position();
    engine.pause();

    assert_eq!(engine.current_position(), once);
    assert_eq!(engine.phase(), Phase::Paused);
}

#[test]
fn stop_while_stopped_keeps_zero() {
    let (mut engine, _driver) = exact_rig();
    load_pair(&mut engine);

    engine.stop();
    engine.stop();
    assert_eq!(engine.current_position(), 0.0);
    assert_eq!(engine.phase(), Phase::Stopped);
}

#[test]
fn stop_rewinds_and_silences() {
    let (mut engine, driver) = exact_rig();
    load_pair(&mut engine);
    engine.set_muted("bass", true);

    engine.play(Some(4.0)).unwrap();
    assert!(!is_silent(&driver.advance(0.5)));

    engine.stop();
    assert_eq!(engine.current_position(), 0.0);
    assert!(is_silent(&driver.advance(0.5)));
}

#[test]
fn stems_start_sample_aligned() {
    let (mut engine, driver) = rig(EngineConfig::default());
    load_pair(&mut engine);

    // Inverse stems cancel exactly only when every frame lines up
    engine.play(Some(1.234)).unwrap();
    let out = driver.advance(2.0);
    assert!(is_silent(&out));

    // Re-synchronized after a seek as well
    engine.seek(6.5).unwrap();
    assert!(is_silent(&driver.advance(1.0)));
}

#[test]
fn muting_changes_only_the_audio() {
    let (mut engine, driver) = exact_rig();
    load_pair(&mut engine);

    engine.play(None).unwrap();
    driver.advance(1.0);
    let before = engine.current_position();

    engine.set_muted("bass", true);
    engine.set_muted("bass", true);
    assert_eq!(engine.current_position(), before);
    assert!(engine.is_playing());
    assert_eq!(engine.is_muted("bass"), Some(true));

    // Only drums remain audible
    let out = driver.advance(0.1);
    assert!(out.peak() > 0.1);

    engine.set_muted("bass", false);
    assert!(is_silent(&driver.advance(0.1)));
}

#[test]
fn shorter_stem_ending_does_not_stop_playback() {
    let (mut engine, driver) = exact_rig();
    engine
        .load([("drums", "drums.wav"), ("short", "short.wav")])
        .unwrap();

    engine.play(None).unwrap();
    driver.advance(5.0);
    assert!(engine.is_playing());
    assert_near(engine.current_position(), 5.0, 1e-9);

    driver.advance(5.0);
    assert!(!engine.is_playing());
}

#[test]
fn failed_fetch_keeps_previous_load() {
    let (mut engine, _driver) = exact_rig();

    let err = engine
        .load([("drums", "drums.wav"), ("vocal", "missing.wav")])
        .unwrap_err();
    assert!(matches!(err, LoadError::FetchFailed { ref stem, .. } if stem.as_str() == "vocal"));
    assert_eq!(engine.duration(), 0.0);
    assert!(engine.stem_names().is_empty());

    engine
        .load([("short", "short.wav"), ("drums", "drums.wav")])
        .unwrap();
    let err = engine
        .load([("drums", "drums.wav"), ("vocal", "missing.wav")])
        .unwrap_err();
    assert!(matches!(err, LoadError::FetchFailed { .. }));
    assert_near(engine.duration(), 4.0, 1e-9);
    assert_eq!(engine.stem_names().len(), 2);
}

#[test]
fn failed_decode_leaves_playback_running() {
    let (mut engine, driver) = exact_rig();
    load_pair(&mut engine);
    engine.set_muted("bass", true);
    engine.play(None).unwrap();
    driver.advance(1.0);

    let err = engine
        .load([("drums", "drums.wav"), ("noise", "noise.wav")])
        .unwrap_err();
    assert!(matches!(err, LoadError::DecodeFailed { ref stem, .. } if stem.as_str() == "noise"));

    assert!(engine.is_playing());
    assert_near(engine.current_position(), 1.0, 1e-9);
    assert!(!is_silent(&driver.advance(0.1)));
}

#[test]
fn load_while_playing_stops_first() {
    let (mut engine, driver) = exact_rig();
    load_pair(&mut engine);
    engine.set_muted("bass", true);
    engine.play(None).unwrap();
    driver.advance(2.0);

    engine.load([("long", "long.wav")]).unwrap();
    assert_eq!(engine.phase(), Phase::Stopped);
    assert_eq!(engine.current_position(), 0.0);
    assert_near(engine.duration(), 12.0, 1e-9);
    assert!(is_silent(&driver.advance(0.5)));
}

#[test]
fn progress_reaches_one() {
    let (mut engine, _driver) = exact_rig();
    let seen = std::sync::Mutex::new(Vec::new());

    engine
        .load_with_progress(
            [("drums", "drums.wav"), ("bass", "bass.wav"), ("short", "short.wav")],
            |fraction| seen.lock().unwrap().push(fraction),
        )
        .unwrap();

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|f| *f > 0.0 && *f <= 1.0));
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seen.last().copied(), Some(1.0));
}

#[test]
fn activation_failure_leaves_stopped_with_offset() {
    let (mut engine, driver) = exact_rig();
    load_pair(&mut engine);
    engine.set_muted("bass", true);
    engine.seek(4.0).unwrap();

    driver.fail_next_activation("permission denied");
    let err = engine.play(None).unwrap_err();
    assert!(matches!(err, PlaybackError::DeviceActivationFailed(_)));
    assert_eq!(engine.phase(), Phase::Stopped);
    assert_eq!(engine.current_position(), 4.0);

    // A later attempt succeeds from the same offset
    engine.resume().unwrap();
    driver.advance(1.0);
    assert_near(engine.current_position(), 5.0, 1e-9);
}

#[test]
fn activation_failure_while_playing_silences_everything() {
    let (mut engine, driver) = exact_rig();
    load_pair(&mut engine);
    engine.set_muted("bass", true);
    engine.play(Some(2.0)).unwrap();
    driver.advance(1.0);

    driver.fail_next_activation("device busy");
    assert!(engine.seek(6.0).is_err());
    assert_eq!(engine.phase(), Phase::Stopped);
    assert_eq!(engine.current_position(), 2.0);
    assert!(is_silent(&driver.advance(0.5)));
}

#[test]
fn full_command_queue_still_silences_every_stem() {
    let (mut engine, driver) = exact_rig();
    engine
        .load([("drums", "drums.wav"), ("long", "long.wav"), ("short", "short.wav")])
        .unwrap();
    engine.play(None).unwrap();

    // Without rendering the audio thread never drains the queue
    let err = (0..200)
        .find_map(|_| engine.seek(1.0).err())
        .expect("queue never filled up");
    assert_eq!(err, PlaybackError::CommandQueueFull);
    assert_eq!(engine.phase(), Phase::Stopped);
    assert_eq!(engine.current_position(), 1.0);
    assert!(is_silent(&driver.advance(0.25)));

    // Once drained, playback starts again from the kept offset
    engine.play(None).unwrap();
    assert!(!is_silent(&driver.advance(0.25)));
    assert!(engine.is_playing());
    assert_near(engine.current_position(), 1.25, 1e-9);
}

#[test]
fn waveform_overview_comes_from_decoded_stems() {
    let (mut engine, _driver) = exact_rig();
    assert_eq!(engine.waveform_peaks("drums", 64), None);
    load_pair(&mut engine);

    let peaks = engine.waveform_peaks("drums", 64).unwrap();
    assert_eq!(peaks.len(), 64);
    assert!(peaks.iter().all(|p| *p > 0.0 && *p <= 1.0));
    assert_eq!(peaks.iter().copied().fold(0.0, f32::max), 1.0);
    assert_eq!(engine.waveform_peaks("vocal", 64), None);
}

#[test]
fn disposed_engine_closes_output() {
    let (mut engine, driver) = exact_rig();
    load_pair(&mut engine);
    engine.set_muted("bass", true);
    engine.play(None).unwrap();
    driver.advance(0.5);

    engine.dispose();
    assert!(driver.is_closed());
    assert!(is_silent(&driver.advance(0.5)));
}

#[test]
fn dropping_engine_closes_output() {
    let (engine, driver) = exact_rig();
    drop(engine);
    assert!(driver.is_closed());
}
