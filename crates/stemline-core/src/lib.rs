//! Stemline Core - multi-stem synchronized playback engine
//!
//! Loads the stems of one piece (drums, bass, guitar, vocal, ...) and plays
//! them as a single performance: one shared clock, one shared start time per
//! transition, independent muting per stem.
//!
//! ```ignore
//! use stemline_core::{EngineConfig, StemEngine};
//!
//! let mut engine = StemEngine::open_default(EngineConfig::default())?;
//! engine.load([("drums", "song/drums.flac"), ("vocal", "song/vocal.flac")])?;
//! engine.play(None)?;
//! engine.set_muted("vocal", true);
//! println!("{:.2}s / {:.2}s", engine.current_position(), engine.duration());
//! ```

pub mod audio;
pub mod config;
pub mod engine;
pub mod loader;
pub mod types;

pub use audio::{AudioError, PlaybackError};
pub use config::EngineConfig;
pub use engine::{Phase, StemEngine};
pub use loader::{FileFetcher, LoadError, StemFetcher};
pub use types::*;
