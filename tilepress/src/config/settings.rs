//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Worker pool and retry behaviour
    pub worker: WorkerSettings,
    /// Pyramid shape
    pub pyramid: PyramidSettings,
    /// Work queue limits
    pub queue: QueueSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// `[worker]` section.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Work items leased per batch; also the render parallelism of a batch
    pub batch_size: usize,
    /// Worst-case seconds to render and commit one tile, used to size leases
    pub seconds_per_tile: u64,
    /// Delay between convergence cycles, in milliseconds
    pub backoff_ms: u64,
    /// Number of concurrent workers per job
    pub workers: usize,
}

/// `[pyramid]` section.
#[derive(Debug, Clone)]
pub struct PyramidSettings {
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Zoom levels needing more tiles than this are skipped
    pub max_tiles_per_zoom: u64,
    /// Edge length of rendered tiles in pixels
    pub tile_size: u32,
}

/// `[queue]` section.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Maximum items per `add_batch` call
    pub add_batch_limit: usize,
}

/// `[logging]` section.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}
