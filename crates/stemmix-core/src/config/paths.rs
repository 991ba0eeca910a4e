//! Standard locations for the config file and stored presets

use std::path::PathBuf;

const APP_DIR: &str = "stemmix";

/// Returns: `{config_dir}/stemmix/config.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.yaml")
}

/// Returns: `{data_dir}/stemmix/presets`
pub fn default_preset_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("presets")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_ends_with_filename() {
        assert!(default_config_path().ends_with("stemmix/config.yaml"));
    }

    #[test]
    fn test_preset_dir_is_app_scoped() {
        assert!(default_preset_dir().ends_with("stemmix/presets"));
    }
}
