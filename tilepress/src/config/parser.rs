//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::Ini;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::coord::MAX_ZOOM;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [worker] section
    if let Some(section) = ini.section(Some("worker")) {
        if let Some(v) = section.get("batch_size") {
            config.worker.batch_size = parse_positive("worker", "batch_size", v)?;
        }
        if let Some(v) = section.get("seconds_per_tile") {
            config.worker.seconds_per_tile = parse_positive("worker", "seconds_per_tile", v)?;
        }
        if let Some(v) = section.get("backoff_ms") {
            config.worker.backoff_ms = parse_number("worker", "backoff_ms", v)?;
        }
        if let Some(v) = section.get("workers") {
            config.worker.workers = parse_positive("worker", "workers", v)?;
        }
    }

    // [pyramid] section
    if let Some(section) = ini.section(Some("pyramid")) {
        if let Some(v) = section.get("min_zoom") {
            config.pyramid.min_zoom = parse_zoom("min_zoom", v)?;
        }
        if let Some(v) = section.get("max_zoom") {
            config.pyramid.max_zoom = parse_zoom("max_zoom", v)?;
        }
        if config.pyramid.min_zoom > config.pyramid.max_zoom {
            return Err(ConfigFileError::InvalidValue {
                section: "pyramid".to_string(),
                key: "min_zoom".to_string(),
                value: config.pyramid.min_zoom.to_string(),
                reason: format!("must not exceed max_zoom ({})", config.pyramid.max_zoom),
            });
        }
        if let Some(v) = section.get("max_tiles_per_zoom") {
            config.pyramid.max_tiles_per_zoom =
                parse_positive("pyramid", "max_tiles_per_zoom", v)?;
        }
        if let Some(v) = section.get("tile_size") {
            config.pyramid.tile_size = parse_positive("pyramid", "tile_size", v)?;
        }
    }

    // [queue] section
    if let Some(section) = ini.section(Some("queue")) {
        if let Some(v) = section.get("add_batch_limit") {
            config.queue.add_batch_limit = parse_positive("queue", "add_batch_limit", v)?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

fn parse_number<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be a non-negative integer".to_string(),
        })
}

fn parse_positive<T>(section: &str, key: &str, value: &str) -> Result<T, ConfigFileError>
where
    T: FromStr + PartialOrd + Default,
{
    let parsed: T = parse_number(section, key, value)?;
    if parsed <= T::default() {
        return Err(ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}

fn parse_zoom(key: &str, value: &str) -> Result<u8, ConfigFileError> {
    let zoom: u8 = parse_number("pyramid", key, value)?;
    if zoom > MAX_ZOOM {
        return Err(ConfigFileError::InvalidValue {
            section: "pyramid".to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: format!("must be between 0 and {}", MAX_ZOOM),
        });
    }
    Ok(zoom)
}

/// Expand a leading `~` to the user's home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;

    fn parse(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(content).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.worker.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.worker.seconds_per_tile, DEFAULT_SECONDS_PER_TILE);
        assert_eq!(config.pyramid.max_zoom, DEFAULT_MAX_ZOOM);
        assert_eq!(config.queue.add_batch_limit, DEFAULT_ADD_BATCH_LIMIT);
    }

    #[test]
    fn test_partial_config() {
        let config = parse("[worker]\nbatch_size = 25\n\n[pyramid]\nmax_zoom = 12\n").unwrap();
        assert_eq!(config.worker.batch_size, 25);
        assert_eq!(config.worker.workers, DEFAULT_WORKERS);
        assert_eq!(config.pyramid.max_zoom, 12);
        assert_eq!(config.pyramid.min_zoom, DEFAULT_MIN_ZOOM);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = parse("[worker]\nbatch_size = 0\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue { section, key, .. } => {
                assert_eq!(section, "worker");
                assert_eq!(key, "batch_size");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        assert!(parse("[worker]\nbackoff_ms = soon\n").is_err());
    }

    #[test]
    fn test_zoom_above_maximum_rejected() {
        assert!(parse("[pyramid]\nmax_zoom = 22\n").is_err());
    }

    #[test]
    fn test_inverted_zoom_range_rejected() {
        assert!(parse("[pyramid]\nmin_zoom = 10\nmax_zoom = 4\n").is_err());
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/logs/tp.log");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert_eq!(expand_tilde("/var/log/tp.log"), PathBuf::from("/var/log/tp.log"));
    }
}
