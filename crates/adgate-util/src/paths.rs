//! Default paths for adgate components
//!
//! - Config: `$ADGATE_CONFIG`, else `$XDG_CONFIG_HOME/adgate/config.toml`,
//!   else `~/.config/adgate/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const ADGATE_CONFIG_ENV: &str = "ADGATE_CONFIG";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "adgate";

/// Get the default configuration file path.
///
/// Order of precedence:
/// 1. `$ADGATE_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/adgate/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/adgate/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(ADGATE_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    config_path_without_env()
}

/// Get the config path without checking the ADGATE_CONFIG env var.
pub fn config_path_without_env() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    // Last resort
    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_points_at_toml_in_app_dir() {
        let path = config_path_without_env();
        assert!(path.to_string_lossy().contains(APP_DIR));
        assert_eq!(path.file_name().unwrap(), CONFIG_FILENAME);
    }
}
