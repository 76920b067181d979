//! Engine tuning configuration

use serde::{Deserialize, Serialize};

use crate::audio::OutputConfig;

/// Configuration for a [`StemEngine`](crate::StemEngine)
///
/// Every field has a default, so a partial YAML file only overrides what it
/// names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between a `play` call and the shared start time, in milliseconds
    /// Gives every voice time to be armed on the audio thread before any
    /// of them must sound.
    /// Default: 50 ms
    pub lookahead_ms: f64,

    /// How close to the end of the piece an end-of-buffer notification must
    /// arrive to count as the song ending, in milliseconds
    /// Default: 20 ms
    pub end_tolerance_ms: f64,

    /// Threads used to fetch and decode stems during a load
    /// Default: 4
    pub load_workers: usize,

    /// Output device settings
    pub output: OutputConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 50.0,
            end_tolerance_ms: 20.0,
            load_workers: 4,
            output: OutputConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Lookahead in seconds (negative values count as zero)
    pub fn lookahead_seconds(&self) -> f64 {
        self.lookahead_ms.max(0.0) / 1000.0
    }

    /// End tolerance in seconds (negative values count as zero)
    pub fn end_tolerance_seconds(&self) -> f64 {
        self.end_tolerance_ms.max(0.0) / 1000.0
    }

    pub fn with_lookahead_ms(mut self, lookahead_ms: f64) -> Self {
        self.lookahead_ms = lookahead_ms;
        self
    }

    pub fn with_load_workers(mut self, workers: usize) -> Self {
        self.load_workers = workers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!((config.lookahead_seconds() - 0.05).abs() < 1e-12);
        assert!((config.end_tolerance_seconds() - 0.02).abs() < 1e-12);
        assert_eq!(config.load_workers, 4);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EngineConfig = serde_yaml::from_str("lookahead_ms: 10\n").unwrap();
        assert_eq!(config.lookahead_ms, 10.0);
        assert_eq!(config.end_tolerance_ms, 20.0);
        assert_eq!(config.output, OutputConfig::default());
    }
}
