//! Default values for configuration settings.

use std::path::PathBuf;

use super::settings::*;

/// Work items leased per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Seconds budgeted per tile when sizing lease visibility.
pub const DEFAULT_SECONDS_PER_TILE: u64 = 2;

/// Pause between convergence cycles.
pub const DEFAULT_BACKOFF_MS: u64 = 1000;

/// Concurrent workers per job (matches the four slice backends).
pub const DEFAULT_WORKERS: usize = 4;

pub const DEFAULT_MIN_ZOOM: u8 = 0;

pub const DEFAULT_MAX_ZOOM: u8 = crate::coord::MAX_ZOOM;

pub const DEFAULT_MAX_TILES_PER_ZOOM: u64 = crate::coord::DEFAULT_MAX_TILES_PER_ZOOM;

pub const DEFAULT_TILE_SIZE: u32 = crate::coord::TILE_SIZE;

/// Provider cap on items per `add_batch`.
pub const DEFAULT_ADD_BATCH_LIMIT: usize = 100;

pub const DEFAULT_LOG_FILE_NAME: &str = "tilepress.log";

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            seconds_per_tile: DEFAULT_SECONDS_PER_TILE,
            backoff_ms: DEFAULT_BACKOFF_MS,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl Default for PyramidSettings {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            max_tiles_per_zoom: DEFAULT_MAX_TILES_PER_ZOOM,
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            add_batch_limit: DEFAULT_ADD_BATCH_LIMIT,
        }
    }
}

// =============================================================================
// ConfigFile Default
// =============================================================================

impl Default for ConfigFile {
    fn default() -> Self {
        let config_dir = super::file::config_directory();

        Self {
            worker: WorkerSettings::default(),
            pyramid: PyramidSettings::default(),
            queue: QueueSettings::default(),
            logging: LoggingSettings {
                file: config_dir.join(DEFAULT_LOG_FILE_NAME),
            },
        }
    }
}

/// Default directory for log files when no config overrides it.
pub fn default_log_dir() -> PathBuf {
    super::file::config_directory()
}
