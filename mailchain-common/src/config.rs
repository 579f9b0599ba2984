//! RON configuration discovery and loading.
//!
//! Configuration files are looked up using the following precedence:
//! 1. `MAILCHAIN_CONFIG` environment variable
//! 2. `./mailchain.config.ron` (current working directory)
//! 3. `/etc/mailchain/mailchain.config.ron` (system-wide config)
//!
//! Files are parsed with the `implicit_some` extension enabled, so optional
//! fields may be written without wrapping them in `Some(..)`.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "MAILCHAIN_CONFIG";

fn default_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("./mailchain.config.ron"),
        PathBuf::from("/etc/mailchain/mailchain.config.ron"),
    ]
}

fn options() -> ron::Options {
    ron::Options::default().with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
}

/// Parse a RON document.
///
/// # Errors
///
/// Returns the parser error, with its position, if `content` is not valid
/// RON for `T`.
pub fn from_str<T: DeserializeOwned>(content: &str) -> Result<T, ron::error::SpannedError> {
    options().from_str(content)
}

/// Read and parse the RON document at `path`.
///
/// # Errors
///
/// If the file cannot be read or does not parse as `T`.
pub fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
    })?;

    from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
}

/// Find the configuration file to use.
///
/// # Errors
///
/// If `MAILCHAIN_CONFIG` points at a missing file, or none of the default
/// locations exist.
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    find_in(std::env::var(CONFIG_ENV).ok(), &default_paths())
}

/// Find and load the configuration file.
///
/// # Errors
///
/// See [`find_config_file`] and [`load`].
pub fn discover<T: DeserializeOwned>() -> anyhow::Result<T> {
    load(&find_config_file()?)
}

fn find_in(env_path: Option<String>, defaults: &[PathBuf]) -> anyhow::Result<PathBuf> {
    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
