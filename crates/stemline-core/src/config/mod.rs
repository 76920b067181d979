//! Configuration for Stemline
//!
//! - `EngineConfig`: engine timing, loader threads and output device
//! - Generic YAML config loading/saving
//! - Default config locations
//!
//! # Usage
//!
//! ```ignore
//! use stemline_core::config::{default_config_path, load_config, save_config, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_config_path());
//! save_config(&config, &default_config_path())?;
//! ```

mod engine;
mod io;
mod paths;

pub use engine::EngineConfig;
pub use io::{load_config, save_config};
pub use paths::{config_dir, default_config_path};
