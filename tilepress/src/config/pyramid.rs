//! Pyramid shape configuration.

use std::ops::RangeInclusive;

use super::defaults::{
    DEFAULT_MAX_TILES_PER_ZOOM, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, DEFAULT_TILE_SIZE,
};
use super::file::ConfigFile;

/// Zoom range and tile limits used when a job starts processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidConfig {
    min_zoom: u8,
    max_zoom: u8,
    max_tiles_per_zoom: u64,
    tile_size: u32,
}

impl PyramidConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zoom_range(mut self, zooms: RangeInclusive<u8>) -> Self {
        self.min_zoom = *zooms.start();
        self.max_zoom = *zooms.end();
        self
    }

    pub fn with_max_tiles_per_zoom(mut self, max: u64) -> Self {
        self.max_tiles_per_zoom = max;
        self
    }

    pub fn with_tile_size(mut self, size: u32) -> Self {
        self.tile_size = size.max(1);
        self
    }

    pub fn zoom_range(&self) -> RangeInclusive<u8> {
        self.min_zoom..=self.max_zoom
    }

    pub fn max_tiles_per_zoom(&self) -> u64 {
        self.max_tiles_per_zoom
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            max_tiles_per_zoom: DEFAULT_MAX_TILES_PER_ZOOM,
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

impl From<&ConfigFile> for PyramidConfig {
    fn from(config: &ConfigFile) -> Self {
        Self::new()
            .with_zoom_range(config.pyramid.min_zoom..=config.pyramid.max_zoom)
            .with_max_tiles_per_zoom(config.pyramid.max_tiles_per_zoom)
            .with_tile_size(config.pyramid.tile_size)
    }
}
