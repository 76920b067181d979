//! RT-safe garbage collection for decoded stem buffers
//!
//! Decoded buffers are shared between the buffer store, the stem voices and
//! the audio thread through `basedrop::Shared`. When the last reference is
//! dropped on the audio thread (a source finishing after a reload replaced
//! its voice), the memory is not freed there: the pointer is queued and the
//! background collector thread frees it.
//!
//! Freeing a multi-minute stereo stem (tens of MB) can take long enough to
//! cause an audible dropout if done inside the output callback.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Global handle for creating `Shared<T>` allocations
///
/// The Collector itself lives on a dedicated GC thread.
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector thread reclaims deferred drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("stem-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it is created on the thread that runs it
            let mut collector = Collector::new();

            if tx.send(collector.handle()).is_err() {
                return;
            }

            log::info!("Stem buffer GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn stem GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for creating `Shared<T>` allocations
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
