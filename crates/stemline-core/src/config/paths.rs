//! Standard locations of Stemline files

use std::path::PathBuf;

/// Directory holding Stemline configuration
///
/// Returns: `{config_dir}/stemline` (e.g. `~/.config/stemline` on Linux),
/// or `./stemline` when the platform has no config directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stemline")
}

/// Default engine config file
///
/// Returns: `{config_dir}/stemline/config.yaml`
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_layout() {
        let path = default_config_path();
        assert!(path.ends_with("stemline/config.yaml"));
        assert!(path.starts_with(config_dir()));
    }
}
