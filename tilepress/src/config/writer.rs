//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[worker]
; Work items leased per batch; each batch renders this many tiles in parallel (default: 10)
batch_size = {}
; Worst-case seconds to render and store one tile (default: 2)
; Lease visibility is batch_size * seconds_per_tile and must cover a whole batch
seconds_per_tile = {}
; Pause between convergence cycles in milliseconds (default: 1000)
backoff_ms = {}
; Concurrent workers per job (default: 4)
workers = {}

[pyramid]
; Zoom range rendered when none is requested (0-21)
min_zoom = {}
max_zoom = {}
; Zoom levels that would need more tiles than this are skipped (default: 1000)
max_tiles_per_zoom = {}
; Tile edge length in pixels (default: 256)
tile_size = {}

[queue]
; Maximum work items per enqueue call (default: 100)
add_batch_limit = {}

[logging]
; Log file path
file = {}
"#,
        config.worker.batch_size,
        config.worker.seconds_per_tile,
        config.worker.backoff_ms,
        config.worker.workers,
        config.pyramid.min_zoom,
        config.pyramid.max_zoom,
        config.pyramid.max_tiles_per_zoom,
        config.pyramid.tile_size,
        config.queue.add_batch_limit,
        config.logging.file.display(),
    )
}
