//! Loading `stagehand.toml`.

use super::error::{ConfigError, ConfigResult};
use super::schema::StagehandConfig;
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;

/// Reads, parses and validates the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] when the file cannot be read, and the
/// errors of [`parse_config_str`] otherwise.
pub fn load_config(path: &Utf8Path) -> ConfigResult<StagehandConfig> {
    let read_error = |source| ConfigError::Read {
        path: path.to_owned(),
        source,
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| read_error(std::io::Error::other("path has no file name")))?;

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(read_error)?;
    let content = dir.read_to_string(file_name).map_err(read_error)?;
    parse_config_str(&content)
}

/// Parses and validates configuration text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys, and
/// validation errors for inconsistent content.
pub fn parse_config_str(content: &str) -> ConfigResult<StagehandConfig> {
    let config: StagehandConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}
