//! Coordinate module
//!
//! World points, overlay placement and tile pyramid enumeration. World units
//! are zoom-0 pixels: the whole world is [`TILE_SIZE`] units across, and each
//! zoom level doubles the number of tiles along both axes.

mod types;

pub use types::{CoordError, Corners, TileCoord, WorldPoint, MAX_ZOOM, TILE_SIZE};

use std::ops::RangeInclusive;

/// Default per-zoom tile cap. Zoom levels needing more tiles are skipped.
pub const DEFAULT_MAX_TILES_PER_ZOOM: u64 = 1000;

/// Converts a world-unit magnitude to a tile index at the given zoom level.
///
/// Negative magnitudes clamp to zero.
#[inline]
pub fn scale_coord(p: f64, zoom: u8) -> u32 {
    let scaled = (p * 2.0_f64.powi(zoom as i32) / TILE_SIZE as f64).floor();
    if scaled <= 0.0 {
        0
    } else {
        scaled as u32
    }
}

/// Returns every tile at `zoom` touched by the overlay's bounding box.
///
/// If the level would need more than `max_tiles` tiles, no tiles are
/// produced for it.
pub fn tiles_for_zoom(corners: &Corners, zoom: u8, max_tiles: u64) -> Vec<TileCoord> {
    let (min, max) = corners.bounds();
    let left = scale_coord(min.x, zoom);
    let right = scale_coord(max.x, zoom);
    let top = scale_coord(min.y, zoom);
    let bottom = scale_coord(max.y, zoom);

    let columns = u64::from(right) - u64::from(left) + 1;
    let rows = u64::from(bottom) - u64::from(top) + 1;
    let count = columns.saturating_mul(rows);
    if count > max_tiles {
        return Vec::new();
    }

    let mut tiles = Vec::with_capacity(count as usize);
    for x in left..=right {
        for y in top..=bottom {
            tiles.push(TileCoord::new(x, y, zoom));
        }
    }
    tiles
}

/// Enumerates the whole pyramid for a zoom range.
pub fn pyramid(
    corners: &Corners,
    zooms: RangeInclusive<u8>,
    max_tiles_per_zoom: u64,
) -> Result<Vec<TileCoord>, CoordError> {
    let (min, max) = (*zooms.start(), *zooms.end());
    if min > max || max > MAX_ZOOM {
        return Err(CoordError::InvalidZoomRange { min, max });
    }
    Ok(zooms
        .flat_map(|zoom| tiles_for_zoom(corners, zoom, max_tiles_per_zoom))
        .collect())
}
