//! Stem loading: fetch, decode, resample, in parallel
//!
//! A load request is an ordered list of `(stem, locator)` pairs. Every stem
//! is fetched and decoded on its own task of a rayon pool created for the
//! load; the first failure fails the whole load and nothing is returned.
//! On success the buffers come back in request order, ready to be moved
//! into a [`BufferStore`].

mod buffer;
mod decode;
mod error;
mod fetch;
mod resample;

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Instant;

use rayon::prelude::*;

pub use buffer::{BufferStore, DecodedBuffer, SharedBuffer};
pub use decode::decode_stem;
pub use error::{DecodeError, LoadError, LoadResult};
pub use fetch::{FileFetcher, StemFetcher};
pub use resample::resample_to;

use crate::types::{StemName, MAX_VOICES};

/// Progress callback, called with the completed fraction of a load
pub type ProgressFn<'a> = &'a (dyn Fn(f32) + Send + Sync);

/// Reject requests the engine can never satisfy before any work starts
fn validate(stems: &[(StemName, String)]) -> LoadResult<()> {
    if stems.is_empty() {
        return Err(LoadError::NoStems);
    }
    if stems.len() > MAX_VOICES {
        return Err(LoadError::TooManyStems {
            count: stems.len(),
            max: MAX_VOICES,
        });
    }

    let mut seen = HashSet::with_capacity(stems.len());
    for (name, _) in stems {
        if !seen.insert(name) {
            return Err(LoadError::DuplicateStem(name.clone()));
        }
    }

    Ok(())
}

/// Fetch and decode one stem, converted to `target_rate`
fn load_one(
    stem: &StemName,
    locator: &str,
    fetcher: &dyn StemFetcher,
    target_rate: u32,
) -> LoadResult<SharedBuffer> {
    let bytes = fetcher.fetch(locator).map_err(|e| LoadError::FetchFailed {
        stem: stem.clone(),
        reason: e.to_string(),
    })?;

    let decode_failed = |e: DecodeError| LoadError::DecodeFailed {
        stem: stem.clone(),
        reason: e.to_string(),
    };

    let decoded = decode_stem(bytes, locator).map_err(decode_failed)?;
    let buffer = resample_to(decoded, target_rate).map_err(decode_failed)?;

    log::debug!(
        "Stem '{}' ready: {:.2}s at {}Hz",
        stem,
        buffer.duration_seconds(),
        buffer.sample_rate()
    );

    Ok(buffer.into_shared())
}

/// Load every stem concurrently on `workers` threads
///
/// `on_progress` is called once per completed stem with a strictly
/// increasing fraction that reaches exactly 1.0 when the last stem is done.
/// Calls are serialized.
pub fn load_stems(
    stems: &[(StemName, String)],
    fetcher: &dyn StemFetcher,
    target_rate: u32,
    workers: usize,
    on_progress: Option<ProgressFn<'_>>,
) -> LoadResult<Vec<(StemName, SharedBuffer)>> {
    validate(stems)?;

    let start = Instant::now();
    let total = stems.len();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.clamp(1, total))
        .thread_name(|i| format!("stem-loader-{}", i))
        .build()
        .map_err(|e| LoadError::WorkerPool(e.to_string()))?;

    let completed = Mutex::new(0usize);

    let buffers = pool.install(|| {
        stems
            .par_iter()
            .map(|(stem, locator)| {
                let buffer = load_one(stem, locator, fetcher, target_rate)?;

                let mut done = completed.lock().unwrap_or_else(|e| e.into_inner());
                *done += 1;
                if let Some(report) = on_progress {
                    let fraction = if *done == total {
                        1.0
                    } else {
                        *done as f32 / total as f32
                    };
                    report(fraction);
                }

                Ok((stem.clone(), buffer))
            })
            .collect::<LoadResult<Vec<_>>>()
    });

    match &buffers {
        Ok(loaded) => log::info!(
            "Loaded {} stems in {:.0}ms",
            loaded.len(),
            start.elapsed().as_secs_f64() * 1000.0
        ),
        Err(e) => log::error!("Stem load failed: {}", e),
    }

    buffers
}
