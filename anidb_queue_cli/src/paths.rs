//! Where the daemon keeps its files
//!
//! Data (the queue database and downloaded images) lives under the XDG data
//! directory, configuration under the XDG config directory. Both can be
//! overridden from the command line.

use std::path::PathBuf;

/// Directory name used under both the data and the config roots
const APP_DIR: &str = "anidb-queue";

const DATABASE_FILE: &str = "queue.db";

/// `~/.local/share/anidb-queue` on Linux, `%APPDATA%\anidb-queue` on Windows
///
/// Falls back to `.anidb-queue` in the working directory when no data
/// directory can be determined.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".anidb-queue"))
}

/// Queue database inside `data_dir`
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}

/// Default configuration file
///
/// `XDG_CONFIG_HOME` is honoured on every Unix, macOS included.
pub fn config_path() -> PathBuf {
    #[cfg(not(target_os = "windows"))]
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        return PathBuf::from(xdg_config).join(APP_DIR).join("config.toml");
    }

    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".anidb-queue"))
        .join("config.toml")
}
